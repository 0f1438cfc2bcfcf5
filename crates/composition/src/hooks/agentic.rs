//! LLM-directed composition, registered as the composition override.
//!
//! The model sees text only: the prompt, the canvas, the background's
//! metadata, and each fragment's label, description, and size. It answers
//! with a placement per fragment. Fragments it skips, and every fragment
//! when the call fails, are placed at random.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use montage_core::provider::{strip_code_fences, Provider, ProviderRequest};
use montage_core::{CapabilityFailure, CompositionOverride, FinalOutput, RunState};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::placement::{render, Layout};
use crate::random::rng_for;

const COMPOSER_SYSTEM_PROMPT: &str = "\
You are a collage artist placing visual fragments onto a canvas.

Given the creative prompt, the background, and the fragments (label, \
description, pixel size), return a JSON object mapping each fragment_id to \
its placement, e.g.
{\"frag_a\": {\"x\": 100, \"y\": 200, \"scale\": 1.0, \"reason\": \"...\"}}

x and y are top-left pixel coordinates on the canvas. scale multiplies the \
fragment's size (0.3 to 2.5). reason is one sentence tying the choice to the \
prompt. Spread fragments across the canvas instead of piling them in the \
centre. Return ONLY the JSON object.";

/// One placement as returned by the model.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlacementHint {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl PlacementHint {
    fn layout(&self) -> Layout {
        Layout {
            scale: self.scale.filter(|s| s.is_finite()).unwrap_or(1.0),
            position: match (self.x, self.y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x as i64, y as i64)),
                _ => None,
            },
            reason: self.reason.clone().filter(|r| !r.trim().is_empty()),
        }
    }
}

/// Parse `{fragment_id: {x, y, scale, reason}}`. Entries that are not
/// objects are skipped; anything but a JSON object is malformed.
pub fn parse_placements(text: &str) -> Result<HashMap<String, PlacementHint>, CapabilityFailure> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| CapabilityFailure::MalformedResponse(format!("placements: {e}")))?;

    let serde_json::Value::Object(map) = value else {
        return Err(CapabilityFailure::MalformedResponse("placements: expected a JSON object".into()));
    };

    Ok(map
        .into_iter()
        .filter_map(|(id, v)| serde_json::from_value::<PlacementHint>(v).ok().map(|hint| (id, hint)))
        .collect())
}

pub struct AgenticCompositor {
    provider: Arc<dyn Provider>,
    model: String,
    seed: Option<u64>,
}

impl AgenticCompositor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            seed: None,
        }
    }

    /// Seed for the random fallback placements.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn user_message(state: &RunState) -> String {
        let background = match state.background_source_id.as_deref() {
            Some(id) => match state.source(id) {
                Some(s) => format!(
                    "'{}': {}",
                    s.title,
                    s.description.as_deref().unwrap_or_default().chars().take(200).collect::<String>()
                ),
                None => "Background image (details unavailable)".to_string(),
            },
            None => "None (white canvas)".to_string(),
        };

        let fragments: Vec<serde_json::Value> = state
            .fragments
            .iter()
            .map(|f| {
                serde_json::json!({
                    "fragment_id": f.id,
                    "label": f.label,
                    "description": f.description.as_deref().unwrap_or_default().chars().take(200).collect::<String>(),
                    "width_px": f.image.width(),
                    "height_px": f.image.height(),
                    "source_title": state.source(&f.source_id).map(|s| s.title.as_str()).unwrap_or_default(),
                })
            })
            .collect();

        format!(
            "Creative prompt: \"{}\"\n\nCanvas: {} pixels.\nBackground: {}\n\nFragments to place ({} total):\n{}",
            state.prompt(),
            state.canvas_size(),
            background,
            state.fragments.len(),
            serde_json::to_string_pretty(&fragments).unwrap_or_default()
        )
    }

    async fn request_placements(&self, state: &RunState) -> Result<HashMap<String, PlacementHint>, CapabilityFailure> {
        let request = ProviderRequest::single(&self.model, COMPOSER_SYSTEM_PROMPT, Self::user_message(state))
            .with_max_tokens(4096);
        let response = self.provider.complete(request).await?;
        parse_placements(&response.text)
    }
}

#[async_trait]
impl CompositionOverride for AgenticCompositor {
    fn name(&self) -> &str {
        "agentic_compositor"
    }

    async fn compose(&self, state: &RunState) -> Result<FinalOutput, CapabilityFailure> {
        let hints = if state.fragments.is_empty() {
            HashMap::new()
        } else {
            match self.request_placements(state).await {
                Ok(hints) => {
                    debug!(placements = hints.len(), "Placements received");
                    hints
                }
                Err(e) => {
                    warn!(error = %e, "Placement request failed, falling back to random placement");
                    HashMap::new()
                }
            }
        };

        let mut rng = rng_for(self.seed);
        Ok(render(
            &state.fragments,
            state.canvas_size(),
            state.background_image.as_ref(),
            &mut rng,
            |fragment| hints.get(&fragment.id).map(PlacementHint::layout).unwrap_or_default(),
        ))
    }
}
