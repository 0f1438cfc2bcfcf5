//! LLM curator: asks a model to pick the best candidates for the prompt.

use std::sync::Arc;

use async_trait::async_trait;
use montage_core::provider::{strip_code_fences, Provider, ProviderRequest};
use montage_core::{CapabilityFailure, SelectionCandidate, Selector};
use tracing::debug;

const CURATOR_SYSTEM_PROMPT: &str = "\
You are an art curator selecting images for a collage. Given a creative prompt \
and a list of candidate images, select the best ones based on:

1. Relevance to the creative prompt
2. Visual diversity: prefer a mix of subjects, styles, and time periods
3. Aesthetic quality: prefer items with descriptive titles and rich metadata

Return ONLY a JSON array of selected identifier strings. No explanation, no \
markdown fences, just the raw JSON array. Example: [\"id1\", \"id2\", \"id3\"]";

/// Descriptions longer than this are cut before being sent.
const MAX_DESCRIPTION_CHARS: usize = 300;

pub struct LlmSelector {
    provider: Arc<dyn Provider>,
    model: String,
    name: String,
}

impl LlmSelector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            name: "llm_curator".into(),
        }
    }

    /// Override the component name reported in errors and logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn user_message(prompt: &str, candidates: &[SelectionCandidate], limit: usize) -> Result<String, CapabilityFailure> {
        let trimmed: Vec<SelectionCandidate> = candidates
            .iter()
            .map(|c| SelectionCandidate {
                description: c
                    .description
                    .as_ref()
                    .map(|d| d.chars().take(MAX_DESCRIPTION_CHARS).collect()),
                ..c.clone()
            })
            .collect();

        let listing = serde_json::to_string_pretty(&trimmed)
            .map_err(|e| CapabilityFailure::InvalidOutput(e.to_string()))?;

        Ok(format!(
            "Creative prompt: {prompt}\n\nSelect up to {limit} items from these candidates:\n\n{listing}"
        ))
    }
}

/// Parse the curator reply: a JSON array whose string entries are ids.
///
/// Non-string entries are dropped and a non-array reply selects nothing.
pub fn parse_selection(text: &str) -> Result<Vec<String>, CapabilityFailure> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| CapabilityFailure::MalformedResponse(format!("selection: {e}")))?;

    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::String(id) => Some(id),
            _ => None,
        })
        .collect())
}

#[async_trait]
impl Selector for LlmSelector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(
        &self,
        prompt: &str,
        candidates: &[SelectionCandidate],
        limit: usize,
    ) -> Result<Vec<String>, CapabilityFailure> {
        if candidates.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let request = ProviderRequest::single(
            &self.model,
            CURATOR_SYSTEM_PROMPT,
            Self::user_message(prompt, candidates, limit)?,
        )
        .with_max_tokens(1024);

        let response = self.provider.complete(request).await?;
        let selected = parse_selection(&response.text)?;
        debug!(selector = %self.name, offered = candidates.len(), selected = selected.len(), "Curator replied");
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_core::provider::ProviderResponse;
    use montage_core::ProviderError;
    use std::sync::Mutex;

    struct RecordingProvider {
        reply: &'static str,
        seen: Mutex<Vec<ProviderRequest>>,
    }

    impl RecordingProvider {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let model = request.model.clone();
            self.seen.lock().unwrap().push(request);
            Ok(ProviderResponse {
                text: self.reply.to_string(),
                model,
            })
        }
    }

    fn candidate(id: &str, description: Option<String>) -> SelectionCandidate {
        SelectionCandidate {
            id: id.into(),
            title: format!("Title {id}"),
            description,
            detail: Some("1901".into()),
        }
    }

    #[test]
    fn parse_tolerates_fences_and_junk_entries() {
        let ids = parse_selection("```json\n[\"a\", 3, null, \"b\"]\n```").unwrap();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn parse_non_array_selects_nothing() {
        assert!(parse_selection(r#"{"ids": ["a"]}"#).unwrap().is_empty());
    }

    #[test]
    fn parse_prose_is_malformed() {
        let err = parse_selection("I picked a and b").unwrap_err();
        assert!(matches!(err, CapabilityFailure::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn sends_prompt_limit_and_trimmed_metadata() {
        let provider = Arc::new(RecordingProvider::new(r#"["b"]"#));
        let selector = LlmSelector::new(provider.clone(), "curator-model");
        let long = "x".repeat(1000);
        let pool = vec![candidate("a", Some(long)), candidate("b", None)];

        let ids = selector.select("old maps", &pool, 1).await.unwrap();
        assert_eq!(ids, vec!["b"]);

        let seen = provider.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.model, "curator-model");
        let body = &request.messages[0].content;
        assert!(body.contains("old maps"));
        assert!(body.contains("up to 1 items"));
        assert!(!body.contains(&"x".repeat(MAX_DESCRIPTION_CHARS + 1)));
    }

    #[tokio::test]
    async fn empty_pool_skips_the_call() {
        let provider = Arc::new(RecordingProvider::new("[]"));
        let selector = LlmSelector::new(provider.clone(), "m").with_name("fragment_curator");
        assert!(selector.select("p", &[], 5).await.unwrap().is_empty());
        assert!(provider.seen.lock().unwrap().is_empty());
        assert_eq!(selector.name(), "fragment_curator");
    }
}
