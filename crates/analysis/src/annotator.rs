//! Annotators: attach a text description to every fragment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use montage_core::provider::{strip_code_fences, Provider, ProviderRequest};
use montage_core::{Annotator, CapabilityFailure, Fragment, SourceItem};
use tracing::{debug, warn};

/// Describes fragments from their geometry and parent metadata. Offline.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderAnnotator;

impl PlaceholderAnnotator {
    pub fn describe(fragment: &Fragment, source: &SourceItem) -> String {
        let r = fragment.region;
        let year = source.year.as_deref().unwrap_or("undated");
        let context: String = source
            .description
            .as_deref()
            .unwrap_or("no description available")
            .chars()
            .take(100)
            .collect();

        format!(
            "{label} fragment {w}x{h}px at ({x1},{y1})-({x2},{y2}) from '{title}' ({year}). Context: {context}",
            label = fragment.label,
            w = r.width(),
            h = r.height(),
            x1 = r.x1,
            y1 = r.y1,
            x2 = r.x2,
            y2 = r.y2,
            title = source.title,
        )
    }
}

#[async_trait]
impl Annotator for PlaceholderAnnotator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn annotate(&self, sources: &[SourceItem], fragments: &mut [Fragment]) -> Result<(), CapabilityFailure> {
        let by_id: HashMap<&str, &SourceItem> = sources.iter().map(|s| (s.id.as_str(), s)).collect();
        for fragment in fragments.iter_mut() {
            if let Some(source) = by_id.get(fragment.source_id.as_str()) {
                fragment.description = Some(Self::describe(fragment, source));
            }
        }
        Ok(())
    }
}

const ANNOTATOR_SYSTEM_PROMPT: &str = "\
You describe visual fragments cut from archive images for a collage artist. \
For each fragment you get its label, pixel size, position in the parent image, \
and the parent item's title and description.

Return ONLY a JSON object mapping each fragment_id to a one-sentence \
description of what the fragment most likely shows. No markdown fences.";

/// One LLM call describing every fragment from text metadata.
pub struct LlmAnnotator {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmAnnotator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn user_message(sources: &[SourceItem], fragments: &[Fragment]) -> Result<String, CapabilityFailure> {
        let by_id: HashMap<&str, &SourceItem> = sources.iter().map(|s| (s.id.as_str(), s)).collect();
        let listing: Vec<serde_json::Value> = fragments
            .iter()
            .map(|f| {
                let source = by_id.get(f.source_id.as_str());
                serde_json::json!({
                    "fragment_id": f.id,
                    "label": f.label,
                    "width_px": f.region.width(),
                    "height_px": f.region.height(),
                    "region": [f.region.x1, f.region.y1, f.region.x2, f.region.y2],
                    "source_title": source.map(|s| s.title.as_str()).unwrap_or_default(),
                    "source_description": source
                        .and_then(|s| s.description.as_deref())
                        .map(|d| d.chars().take(200).collect::<String>()),
                })
            })
            .collect();

        let listing = serde_json::to_string_pretty(&listing)
            .map_err(|e| CapabilityFailure::InvalidOutput(e.to_string()))?;
        Ok(format!("Fragments ({} total):\n{listing}", fragments.len()))
    }
}

/// Parse `{"fragment_id": "description", ...}`. Non-string values are ignored.
pub fn parse_descriptions(text: &str) -> Result<HashMap<String, String>, CapabilityFailure> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| CapabilityFailure::MalformedResponse(format!("annotations: {e}")))?;

    let serde_json::Value::Object(map) = value else {
        return Err(CapabilityFailure::MalformedResponse("annotations: expected a JSON object".into()));
    };

    Ok(map
        .into_iter()
        .filter_map(|(id, v)| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some((id, s)),
            _ => None,
        })
        .collect())
}

#[async_trait]
impl Annotator for LlmAnnotator {
    fn name(&self) -> &str {
        "llm_annotator"
    }

    async fn annotate(&self, sources: &[SourceItem], fragments: &mut [Fragment]) -> Result<(), CapabilityFailure> {
        if fragments.is_empty() {
            return Ok(());
        }

        let request = ProviderRequest::single(
            &self.model,
            ANNOTATOR_SYSTEM_PROMPT,
            Self::user_message(sources, fragments)?,
        )
        .with_max_tokens(4096);

        let response = self.provider.complete(request).await?;
        let mut descriptions = parse_descriptions(&response.text)?;

        let mut described = 0;
        for fragment in fragments.iter_mut() {
            if let Some(text) = descriptions.remove(&fragment.id) {
                fragment.description = Some(text);
                described += 1;
            }
        }

        if described < fragments.len() {
            warn!(described, total = fragments.len(), "Some fragments were not described");
        }
        debug!(described, "Annotation done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid, source};
    use montage_core::provider::ProviderResponse;
    use montage_core::{ProviderError, Region};

    struct CannedProvider(&'static str);

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                text: self.0.to_string(),
                model: request.model,
            })
        }
    }

    fn fragment(id: &str, source_id: &str) -> Fragment {
        Fragment::new(id, source_id, Region::new(2, 4, 12, 9), "unknown", solid(10, 5, [0, 0, 0, 255]))
    }

    #[tokio::test]
    async fn placeholder_uses_geometry_and_source() {
        let sources = vec![source("s1", None)];
        let mut fragments = vec![fragment("s1_unknown_0", "s1"), fragment("orphan_0", "orphan")];

        PlaceholderAnnotator.annotate(&sources, &mut fragments).await.unwrap();

        let text = fragments[0].description.as_deref().unwrap();
        assert!(text.contains("10x5px"));
        assert!(text.contains("(2,4)-(12,9)"));
        assert!(text.contains("Title s1"));
        assert!(text.contains("1901"));
        assert!(fragments[1].description.is_none());
    }

    #[test]
    fn parses_description_map() {
        let map = parse_descriptions("```json\n{\"a\": \"A fern\", \"b\": 3, \"c\": \" \"}\n```").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["a"], "A fern");
    }

    #[test]
    fn array_reply_is_malformed() {
        assert!(parse_descriptions("[\"a\"]").is_err());
    }

    #[tokio::test]
    async fn llm_annotator_keeps_existing_text_for_missing_ids() {
        let annotator = LlmAnnotator::new(Arc::new(CannedProvider(r#"{"f1": "A pressed fern"}"#)), "m");
        let sources = vec![source("s1", None)];
        let mut fragments = vec![fragment("f1", "s1"), fragment("f2", "s1")];
        fragments[1].description = Some("earlier".into());

        annotator.annotate(&sources, &mut fragments).await.unwrap();

        assert_eq!(fragments[0].description.as_deref(), Some("A pressed fern"));
        assert_eq!(fragments[1].description.as_deref(), Some("earlier"));
    }
}
