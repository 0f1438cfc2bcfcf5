//! Error types for the montage domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The top-level [`Error`]
//! has exactly three run-relevant families: malformed run arguments,
//! hook-registration mistakes, and failures of a pluggable stage.

use std::fmt;
use thiserror::Error;

use crate::hook::HookPoint;

/// The top-level error type for all montage operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnknownInsertionPoint(#[from] UnknownInsertionPointError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed run arguments. Raised before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("canvas dimensions must be positive, got {width}x{height}")]
    NonPositiveCanvas { width: u32, height: u32 },

    #[error("max_items must be positive")]
    NonPositiveMaxItems,
}

/// A hook was registered against a point that does not exist for its kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown insertion point '{name}' (expected one of: {expected})")]
pub struct UnknownInsertionPointError {
    pub name: String,
    pub expected: String,
}

/// The fixed stages of a run. Used to attach context to capability failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Discovery,
    SourceCuration,
    Caching,
    Analysis,
    FragmentCuration,
    Hook(HookPoint),
    BackgroundResolution,
    Annotation,
    Composition,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Discovery => f.write_str("discovery"),
            Stage::SourceCuration => f.write_str("source_curation"),
            Stage::Caching => f.write_str("caching"),
            Stage::Analysis => f.write_str("analysis"),
            Stage::FragmentCuration => f.write_str("fragment_curation"),
            Stage::Hook(point) => write!(f, "hook:{point}"),
            Stage::BackgroundResolution => f.write_str("background_resolution"),
            Stage::Annotation => f.write_str("annotation"),
            Stage::Composition => f.write_str("composition"),
        }
    }
}

/// A pluggable stage implementation (or hook) failed during a run.
#[derive(Debug, Error)]
#[error("{stage} failed in '{component}': {source}")]
pub struct CapabilityError {
    pub stage: Stage,
    pub component: String,
    #[source]
    pub source: CapabilityFailure,
}

impl CapabilityError {
    pub fn new(stage: Stage, component: impl Into<String>, source: CapabilityFailure) -> Self {
        Self {
            stage,
            component: component.into(),
            source,
        }
    }
}

/// The low-level cause reported by a capability implementation.
#[derive(Debug, Error)]
pub enum CapabilityFailure {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Failures of the LLM provider layer.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_error_carries_stage_context() {
        let err = Error::Capability(CapabilityError::new(
            Stage::Discovery,
            "internet_archive",
            CapabilityFailure::Timeout("search".into()),
        ));
        let text = err.to_string();
        assert!(text.contains("discovery"));
        assert!(text.contains("internet_archive"));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn hook_stage_displays_point_name() {
        assert_eq!(Stage::Hook(HookPoint::AfterCuration).to_string(), "hook:after_curation");
    }

    #[test]
    fn provider_error_converts_into_failure() {
        let failure: CapabilityFailure = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        }
        .into();
        assert!(failure.to_string().contains("429"));
    }

    #[test]
    fn validation_error_displays_dimensions() {
        let err = Error::from(ValidationError::NonPositiveCanvas { width: 0, height: 10 });
        assert!(err.to_string().contains("0x10"));
    }
}
