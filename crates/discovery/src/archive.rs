//! Internet Archive discovery backend.
//!
//! Executes each planned query against the `advancedsearch.php` JSON API,
//! always restricted to `mediatype:image`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use montage_core::{CapabilityFailure, DiscoveryBackend, QueryPlan, SearchQuery, SourceCandidate};
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_SEARCH_URL: &str = "https://archive.org/advancedsearch.php";
const PREVIEW_URL_PREFIX: &str = "https://archive.org/services/img/";
const DETAILS_URL_PREFIX: &str = "https://archive.org/details/";
const IMAGE_FIELDS: [&str; 5] = ["identifier", "title", "creator", "date", "description"];

pub struct InternetArchiveBackend {
    search_url: String,
    rows_per_query: usize,
    client: reqwest::Client,
}

impl InternetArchiveBackend {
    pub fn new(search_url: impl Into<String>, rows_per_query: usize, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            search_url: search_url.into(),
            rows_per_query: rows_per_query.max(1),
            client,
        }
    }

    async fn search(&self, query: &SearchQuery, rows: usize) -> Result<Vec<SourceCandidate>, CapabilityFailure> {
        let q = build_lucene_query(query);
        let mut params: Vec<(&str, String)> = vec![("q", q)];
        params.extend(IMAGE_FIELDS.iter().map(|f| ("fl[]", (*f).to_string())));
        params.push(("rows", rows.to_string()));
        params.push(("page", "1".into()));
        params.push(("output", "json".into()));

        let response = self
            .client
            .get(&self.search_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CapabilityFailure::Timeout(e.to_string())
                } else {
                    CapabilityFailure::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityFailure::Backend(format!(
                "Internet Archive search returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CapabilityFailure::Network(e.to_string()))?;
        parse_search_response(&body)
    }
}

impl Default for InternetArchiveBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_URL, 20, Duration::from_secs(30))
    }
}

/// `(keywords) AND mediatype:image [AND collection:c] [AND date:[range]]`
pub fn build_lucene_query(query: &SearchQuery) -> String {
    let mut q = format!("({}) AND mediatype:image", query.keywords.trim());
    if let Some(collection) = &query.collection {
        q.push_str(&format!(" AND collection:{collection}"));
    }
    if let Some(range) = &query.date_filter {
        q.push_str(&format!(" AND date:[{range}]"));
    }
    q
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    title: Option<FieldValue>,
    #[serde(default)]
    creator: Option<FieldValue>,
    #[serde(default)]
    date: Option<FieldValue>,
    #[serde(default)]
    description: Option<FieldValue>,
}

/// Archive metadata fields may be a string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl FieldValue {
    fn joined(self, sep: &str) -> Option<String> {
        let text = match self {
            FieldValue::One(s) => s,
            FieldValue::Many(v) => v.join(sep),
        };
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Parse an `advancedsearch.php` JSON body into candidates.
///
/// Docs without an identifier are skipped. `year` is the leading four
/// digits of the `date` field when present.
pub fn parse_search_response(body: &str) -> Result<Vec<SourceCandidate>, CapabilityFailure> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|e| CapabilityFailure::MalformedResponse(format!("Internet Archive search: {e}")))?;

    let candidates = envelope
        .response
        .docs
        .into_iter()
        .filter_map(|doc| {
            let id = doc.identifier.filter(|i| !i.trim().is_empty())?;
            let year = doc
                .date
                .and_then(|d| d.joined(" "))
                .and_then(|d| {
                    let year: String = d.chars().take(4).collect();
                    (year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())).then_some(year)
                });

            Some(SourceCandidate {
                title: doc.title.and_then(|t| t.joined(" ")).unwrap_or_default(),
                description: doc.description.and_then(|d| d.joined("\n")),
                year,
                creator: doc.creator.and_then(|c| c.joined(", ")),
                preview_url: format!("{PREVIEW_URL_PREFIX}{id}"),
                details_url: Some(format!("{DETAILS_URL_PREFIX}{id}")),
                id,
            })
        })
        .collect();

    Ok(candidates)
}

#[async_trait]
impl DiscoveryBackend for InternetArchiveBackend {
    fn name(&self) -> &str {
        "internet_archive"
    }

    async fn execute(&self, plan: &QueryPlan, max_candidates: usize) -> Result<Vec<SourceCandidate>, CapabilityFailure> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut last_error = None;

        for query in &plan.queries {
            if candidates.len() >= max_candidates {
                break;
            }

            let rows = self.rows_per_query.min(max_candidates - candidates.len());
            match self.search(query, rows).await {
                Ok(found) => {
                    debug!(keywords = %query.keywords, found = found.len(), "Archive query executed");
                    for candidate in found {
                        if candidates.len() >= max_candidates {
                            break;
                        }
                        if seen.insert(candidate.id.clone()) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(e) => {
                    warn!(keywords = %query.keywords, error = %e, "Archive query failed");
                    last_error = Some(e);
                }
            }
        }

        // A single failed query is tolerated; all of them failing is not.
        match last_error {
            Some(e) if candidates.is_empty() => Err(e),
            _ => Ok(candidates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "responseHeader": {"status": 0},
        "response": {
            "numFound": 3,
            "start": 0,
            "docs": [
                {
                    "identifier": "flora-1890",
                    "title": "Flora Danica plate",
                    "creator": ["Oeder, Georg", "Muller, Otto"],
                    "date": "1890-01-01T00:00:00Z",
                    "description": ["Hand-coloured engraving.", "Plate 12."]
                },
                {"title": "no identifier here"},
                {"identifier": "map-x", "date": "circa"}
            ]
        }
    }"#;

    #[test]
    fn builds_filtered_query() {
        let query = SearchQuery {
            keywords: "(botanical OR flora) AND illustration".into(),
            collection: Some("biodiversity".into()),
            date_filter: Some("1800 TO 1900".into()),
        };
        assert_eq!(
            build_lucene_query(&query),
            "((botanical OR flora) AND illustration) AND mediatype:image \
             AND collection:biodiversity AND date:[1800 TO 1900]"
        );
        assert_eq!(
            build_lucene_query(&SearchQuery::keywords("maps")),
            "(maps) AND mediatype:image"
        );
    }

    #[test]
    fn parses_docs_and_skips_missing_identifiers() {
        let candidates = parse_search_response(SAMPLE).unwrap();
        assert_eq!(candidates.len(), 2);

        let flora = &candidates[0];
        assert_eq!(flora.id, "flora-1890");
        assert_eq!(flora.year.as_deref(), Some("1890"));
        assert_eq!(flora.creator.as_deref(), Some("Oeder, Georg, Muller, Otto"));
        assert_eq!(flora.description.as_deref(), Some("Hand-coloured engraving.\nPlate 12."));
        assert_eq!(flora.preview_url, "https://archive.org/services/img/flora-1890");
        assert_eq!(flora.details_url.as_deref(), Some("https://archive.org/details/flora-1890"));

        let map = &candidates[1];
        assert_eq!(map.title, "");
        assert!(map.year.is_none());
    }

    #[test]
    fn malformed_body_is_reported() {
        let err = parse_search_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, CapabilityFailure::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn all_queries_failing_is_an_error() {
        let backend = InternetArchiveBackend::new("http://127.0.0.1:1/search", 5, Duration::from_secs(2));
        let plan = QueryPlan::new(vec![SearchQuery::keywords("a")]);
        assert!(backend.execute(&plan, 10).await.is_err());
    }

    #[tokio::test]
    async fn empty_plan_yields_no_candidates() {
        let backend = InternetArchiveBackend::default();
        let candidates = backend.execute(&QueryPlan::default(), 10).await.unwrap();
        assert!(candidates.is_empty());
    }
}
