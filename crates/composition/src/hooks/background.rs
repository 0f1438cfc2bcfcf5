use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use montage_core::provider::{Provider, ProviderRequest};
use montage_core::{CapabilityFailure, PipelineHook, RunState};
use tracing::{debug, warn};

const BACKGROUND_SYSTEM_PROMPT: &str = "\
You are choosing the background for an artistic collage.

You get the creative prompt, the canvas size, and the curated source images \
with their titles, descriptions, and the pixel size of their largest fragment. \
Pick the ONE source that works best stretched across the whole canvas.

Prefer large, atmospheric, scenic, landscape, or abstract images. Avoid \
isolated small objects and sources whose largest fragment is tiny.

Reply with the identifier of the chosen source only, as a plain string.";

/// Lets the LLM choose which curated source becomes the canvas background.
///
/// Sets `background_source_id`; an unrecognised reply leaves it unset.
pub struct BackgroundSelector {
    provider: Arc<dyn Provider>,
    model: String,
}

impl BackgroundSelector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn user_message(state: &RunState) -> String {
        let mut largest: HashMap<&str, (u32, u32)> = HashMap::new();
        for fragment in &state.fragments {
            let size = (fragment.region.width(), fragment.region.height());
            let entry = largest.entry(fragment.source_id.as_str()).or_insert((0, 0));
            if u64::from(size.0) * u64::from(size.1) > u64::from(entry.0) * u64::from(entry.1) {
                *entry = size;
            }
        }

        let listing: Vec<serde_json::Value> = state
            .sources
            .iter()
            .map(|s| {
                let (w, h) = largest.get(s.id.as_str()).copied().unwrap_or((0, 0));
                serde_json::json!({
                    "identifier": s.id,
                    "title": s.title,
                    "description": s.description.as_deref().map(|d| d.chars().take(300).collect::<String>()),
                    "year": s.year,
                    "creator": s.creator,
                    "largest_fragment_px": [w, h],
                })
            })
            .collect();

        format!(
            "Creative prompt: {}\n\nCanvas size: {} pixels.\n\nSources:\n{}",
            state.prompt(),
            state.canvas_size(),
            serde_json::to_string_pretty(&listing).unwrap_or_default()
        )
    }
}

#[async_trait]
impl PipelineHook for BackgroundSelector {
    fn name(&self) -> &str {
        "background_selector"
    }

    async fn run(&self, state: &mut RunState) -> Result<(), CapabilityFailure> {
        if state.sources.is_empty() {
            debug!("No sources, skipping background selection");
            return Ok(());
        }

        let request = ProviderRequest::single(&self.model, BACKGROUND_SYSTEM_PROMPT, Self::user_message(state))
            .with_max_tokens(128);
        let response = self.provider.complete(request).await?;
        let choice = response.text.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();

        if state.source(choice).is_some() {
            debug!(source = choice, "Background selected");
            state.background_source_id = Some(choice.to_string());
        } else {
            warn!(reply = choice, "Background reply names no curated source, keeping white canvas");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use montage_core::provider::ProviderResponse;
    use montage_core::{CanvasSize, Fragment, ProviderError, Region, SourceItem};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedProvider {
        reply: &'static str,
        calls: AtomicUsize,
    }

    impl CannedProvider {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResponse {
                text: self.reply.to_string(),
                model: request.model,
            })
        }
    }

    fn source(id: &str) -> SourceItem {
        SourceItem {
            id: id.into(),
            title: format!("Title {id}"),
            description: None,
            year: None,
            creator: None,
            preview_url: String::new(),
            details_url: None,
            local_path: None,
        }
    }

    fn state() -> RunState {
        let mut state = RunState::new("misty mountains", CanvasSize::new(640, 480).unwrap());
        state.sources = vec![source("peak"), source("valley")];
        state.fragments = vec![Fragment::new("peak_unknown_0", "peak", Region::full(30, 20), "unknown", RgbaImage::new(30, 20))];
        state
    }

    #[tokio::test]
    async fn quoted_known_id_is_accepted() {
        let hook = BackgroundSelector::new(CannedProvider::new("\"valley\"\n"), "m");
        let mut s = state();
        hook.run(&mut s).await.unwrap();
        assert_eq!(s.background_source_id.as_deref(), Some("valley"));
    }

    #[tokio::test]
    async fn unknown_id_leaves_background_unset() {
        let hook = BackgroundSelector::new(CannedProvider::new("the second one"), "m");
        let mut s = state();
        hook.run(&mut s).await.unwrap();
        assert!(s.background_source_id.is_none());
    }

    #[tokio::test]
    async fn no_sources_skips_the_call() {
        let provider = CannedProvider::new("peak");
        let hook = BackgroundSelector::new(provider.clone(), "m");
        let mut s = RunState::new("p", CanvasSize::new(10, 10).unwrap());
        hook.run(&mut s).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn message_reports_largest_fragment() {
        let text = BackgroundSelector::user_message(&state());
        assert!(text.contains("640x480"));
        let listing: serde_json::Value = serde_json::from_str(text.split("Sources:\n").nth(1).unwrap()).unwrap();
        assert_eq!(listing[0]["largest_fragment_px"], serde_json::json!([30, 20]));
        assert_eq!(listing[1]["largest_fragment_px"], serde_json::json!([0, 0]));
    }
}
