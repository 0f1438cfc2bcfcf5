//! Capability contracts: the abstractions over every pluggable stage.
//!
//! The orchestrator depends only on these traits. Each has at least one
//! offline implementation (passthrough/stub) and one real backend, living in
//! the discovery, curation, analysis, and composition crates.
//!
//! Capabilities never hold a reference to `RunState`: they take explicit
//! inputs and return new data, so one instance can serve many runs.

use std::path::PathBuf;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityFailure;
use crate::model::{FinalOutput, Fragment, QueryPlan, SourceCandidate, SourceItem};
use crate::state::CanvasSize;

type CapResult<T> = std::result::Result<T, CapabilityFailure>;

/// Turns a creative prompt into a query plan. Must not have side effects.
#[async_trait]
pub trait DiscoveryAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(&self, prompt: &str) -> CapResult<QueryPlan>;
}

/// Executes a query plan against a content source.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Return at most `max_candidates` hits, in plan order.
    async fn execute(&self, plan: &QueryPlan, max_candidates: usize) -> CapResult<Vec<SourceCandidate>>;
}

/// The metadata a selector sees for one item, source or fragment alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCandidate {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&SourceCandidate> for SelectionCandidate {
    fn from(c: &SourceCandidate) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            description: c.description.clone(),
            detail: c.year.clone(),
        }
    }
}

impl From<&Fragment> for SelectionCandidate {
    fn from(f: &Fragment) -> Self {
        Self {
            id: f.id.clone(),
            title: f.label.clone(),
            description: f.description.clone(),
            detail: Some(format!(
                "{}x{}px from {}",
                f.region.width(),
                f.region.height(),
                f.source_id
            )),
        }
    }
}

/// Narrows a candidate list to the identifiers that best match a prompt.
///
/// Implementations are untrusted: the orchestrator drops unknown ids and
/// enforces `limit` itself.
#[async_trait]
pub trait Selector: Send + Sync {
    fn name(&self) -> &str;

    async fn select(&self, prompt: &str, candidates: &[SelectionCandidate], limit: usize) -> CapResult<Vec<String>>;
}

/// Resolves a local copy of a remote asset, keyed by identifier.
#[async_trait]
pub trait AssetCache: Send + Sync {
    async fn get_or_fetch(&self, id: &str, remote_url: &str) -> CapResult<PathBuf>;
}

/// Extracts fragments from cached sources.
///
/// Produces zero or more fragments per source, grouped by source.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, sources: &[SourceItem]) -> CapResult<Vec<Fragment>>;
}

/// Fills in fragment descriptions.
///
/// Receives a slice so it can neither remove nor reorder fragments.
#[async_trait]
pub trait Annotator: Send + Sync {
    fn name(&self) -> &str;

    async fn annotate(&self, sources: &[SourceItem], fragments: &mut [Fragment]) -> CapResult<()>;
}

/// Lays fragments out on a canvas.
pub trait Compositor: Send + Sync {
    fn name(&self) -> &str;

    fn compose(
        &self,
        fragments: &[Fragment],
        canvas: CanvasSize,
        background: Option<&RgbaImage>,
    ) -> CapResult<FinalOutput>;
}
