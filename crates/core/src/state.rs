//! The run's working memory, threaded through every stage and hook.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::ValidationError;
use crate::model::{Fragment, SourceItem};

/// Output canvas dimensions in pixels. Both components are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct CanvasSize {
    width: u32,
    height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Result<Self, ValidationError> {
        if width == 0 || height == 0 {
            return Err(ValidationError::NonPositiveCanvas { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl TryFrom<(u32, u32)> for CanvasSize {
    type Error = ValidationError;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(width, height)
    }
}

impl From<CanvasSize> for (u32, u32) {
    fn from(c: CanvasSize) -> Self {
        (c.width, c.height)
    }
}

impl fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Mutable state for exactly one pipeline run.
///
/// `prompt` and `canvas_size` are fixed at construction. Stages populate
/// `sources` and `fragments`; hooks may mutate anything public. Only hooks
/// set `background_source_id`; the orchestrator resolves it into
/// `background_image`.
#[derive(Clone)]
pub struct RunState {
    prompt: String,
    canvas_size: CanvasSize,
    pub sources: Vec<SourceItem>,
    pub fragments: Vec<Fragment>,
    pub background_source_id: Option<String>,
    pub background_image: Option<RgbaImage>,
}

impl RunState {
    pub fn new(prompt: impl Into<String>, canvas_size: CanvasSize) -> Self {
        Self {
            prompt: prompt.into(),
            canvas_size,
            sources: Vec::new(),
            fragments: Vec::new(),
            background_source_id: None,
            background_image: None,
        }
    }

    /// Construct from raw dimensions, failing on a zero component.
    pub fn with_dimensions(prompt: impl Into<String>, width: u32, height: u32) -> Result<Self, ValidationError> {
        Ok(Self::new(prompt, CanvasSize::new(width, height)?))
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn canvas_size(&self) -> CanvasSize {
        self.canvas_size
    }

    pub fn source(&self, id: &str) -> Option<&SourceItem> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// The first fragment id that appears more than once, if any.
    pub fn duplicate_fragment_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.fragments
            .iter()
            .map(|f| f.id.as_str())
            .find(|id| !seen.insert(*id))
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("prompt", &self.prompt)
            .field("canvas_size", &self.canvas_size)
            .field("sources", &self.sources.len())
            .field("fragments", &self.fragments.len())
            .field("background_source_id", &self.background_source_id)
            .field("background_image", &self.background_image.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;

    #[test]
    fn canvas_rejects_zero_dimension() {
        assert_eq!(
            CanvasSize::new(0, 1080),
            Err(ValidationError::NonPositiveCanvas { width: 0, height: 1080 })
        );
        assert!(CanvasSize::new(1920, 0).is_err());
        assert!(RunState::with_dimensions("x", 0, 0).is_err());
    }

    #[test]
    fn new_state_starts_empty() {
        let state = RunState::with_dimensions("vintage botanical illustrations", 1920, 1080).unwrap();
        assert_eq!(state.prompt(), "vintage botanical illustrations");
        assert_eq!(state.canvas_size().width(), 1920);
        assert!(state.sources.is_empty());
        assert!(state.fragments.is_empty());
        assert!(state.background_source_id.is_none());
        assert!(state.background_image.is_none());
    }

    #[test]
    fn canvas_deserialization_validates() {
        let ok: CanvasSize = serde_json::from_str("[640, 480]").unwrap();
        assert_eq!(ok.to_string(), "640x480");
        assert!(serde_json::from_str::<CanvasSize>("[640, 0]").is_err());
    }

    #[test]
    fn detects_duplicate_fragment_ids() {
        let mut state = RunState::with_dimensions("p", 10, 10).unwrap();
        let frag = |id: &str| Fragment::new(id, "s", Region::full(1, 1), "unknown", RgbaImage::new(1, 1));
        state.fragments = vec![frag("a"), frag("b")];
        assert!(state.duplicate_fragment_id().is_none());
        state.fragments.push(frag("a"));
        assert_eq!(state.duplicate_fragment_id(), Some("a"));
    }
}
