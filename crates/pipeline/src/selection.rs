//! Reconciling untrusted selector replies with the candidate pool.

use std::collections::HashSet;

use montage_core::{SelectionCandidate, SourceCandidate};
use tracing::debug;

/// Drop repeated identifiers, keeping the first record seen for each.
pub fn dedupe_candidates(candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    let before = candidates.len();
    let mut seen = HashSet::new();
    let unique: Vec<SourceCandidate> = candidates
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();

    if unique.len() < before {
        debug!(dropped = before - unique.len(), "Removed duplicate candidates");
    }
    unique
}

/// Map a selector's reply onto indices into `pool`.
///
/// Unknown and repeated ids are ignored. When the reply names more than
/// `limit` known ids, the first `limit` of them (reply order) win. The
/// returned indices are ascending, so the selected set keeps pool order.
pub fn resolve_selection(pool: &[SelectionCandidate], chosen: &[String], limit: usize) -> Vec<usize> {
    let mut picked: Vec<usize> = Vec::with_capacity(limit.min(chosen.len()));
    let mut unknown = 0usize;

    for id in chosen {
        if picked.len() == limit {
            break;
        }
        match pool.iter().position(|c| &c.id == id) {
            Some(index) if !picked.contains(&index) => picked.push(index),
            Some(_) => {}
            None => unknown += 1,
        }
    }

    if unknown > 0 {
        debug!(unknown, "Selector returned identifiers outside the pool");
    }
    picked.sort_unstable();
    picked
}

/// Keep the items at `picked` (ascending indices), preserving their order.
pub(crate) fn take_selected<T>(items: Vec<T>, picked: &[usize]) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picked.binary_search(i).is_ok())
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str) -> SourceCandidate {
        SourceCandidate {
            id: id.into(),
            title: title.into(),
            description: None,
            year: None,
            creator: None,
            preview_url: format!("https://archive.org/services/img/{id}"),
            details_url: None,
        }
    }

    fn pool(ids: &[&str]) -> Vec<SelectionCandidate> {
        ids.iter()
            .map(|id| SelectionCandidate {
                id: id.to_string(),
                title: String::new(),
                description: None,
                detail: None,
            })
            .collect()
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dedupe_keeps_first_seen_record() {
        let out = dedupe_candidates(vec![
            candidate("a", "first"),
            candidate("b", "only"),
            candidate("a", "second"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].title, "first");
        assert_eq!(out[1].id, "b");
    }

    #[test]
    fn unknown_ids_are_dropped() {
        let picked = resolve_selection(&pool(&["a", "b", "c"]), &ids(&["ghost", "c"]), 5);
        assert_eq!(picked, vec![2]);
    }

    #[test]
    fn result_follows_pool_order() {
        let picked = resolve_selection(&pool(&["a", "b", "c", "d"]), &ids(&["d", "b"]), 5);
        assert_eq!(picked, vec![1, 3]);
    }

    #[test]
    fn over_long_reply_is_truncated_in_reply_order() {
        let picked = resolve_selection(&pool(&["a", "b", "c", "d"]), &ids(&["d", "c", "a"]), 2);
        assert_eq!(picked, vec![2, 3]);
    }

    #[test]
    fn repeats_count_once() {
        let picked = resolve_selection(&pool(&["a", "b"]), &ids(&["a", "a", "a", "b"]), 2);
        assert_eq!(picked, vec![0, 1]);
    }

    #[test]
    fn take_selected_keeps_order() {
        let kept = take_selected(vec!["a", "b", "c", "d"], &[0, 2]);
        assert_eq!(kept, vec!["a", "c"]);
    }

    #[test]
    fn empty_reply_selects_nothing() {
        assert!(resolve_selection(&pool(&["a"]), &[], 3).is_empty());
    }
}
