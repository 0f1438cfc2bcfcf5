use async_trait::async_trait;
use montage_core::{CapabilityFailure, SelectionCandidate, Selector};

/// Keeps the first `limit` candidates. Deterministic and offline.
#[derive(Debug, Default, Clone)]
pub struct FirstSelector;

#[async_trait]
impl Selector for FirstSelector {
    fn name(&self) -> &str {
        "first_n"
    }

    async fn select(
        &self,
        _prompt: &str,
        candidates: &[SelectionCandidate],
        limit: usize,
    ) -> Result<Vec<String>, CapabilityFailure> {
        Ok(candidates.iter().take(limit).map(|c| c.id.clone()).collect())
    }
}
