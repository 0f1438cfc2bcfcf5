//! # Montage Core
//!
//! Domain types, capability traits, the hook registry, and error definitions
//! for the montage collage pipeline. This crate has no I/O of its own: it
//! defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every pluggable stage is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping a no-op passthrough for a real backend via configuration
//! - Testing the orchestrator with scripted stub capabilities
//! - A clean dependency graph (all crates depend inward on core)

pub mod capability;
pub mod error;
pub mod event;
pub mod hook;
pub mod model;
pub mod provider;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use capability::{
    Analyzer, AssetCache, Annotator, Compositor, DiscoveryAgent, DiscoveryBackend, SelectionCandidate,
    Selector,
};
pub use error::{
    CapabilityError, CapabilityFailure, Error, ProviderError, Result, Stage, UnknownInsertionPointError,
    ValidationError,
};
pub use event::{EventBus, PipelineEvent};
pub use hook::{CompositionOverride, FnHook, HookKind, HookManager, HookPoint, PipelineHook};
pub use model::{
    FinalOutput, Fragment, Placement, ProvenanceEntry, QueryPlan, Region, SearchQuery, SourceCandidate,
    SourceItem,
};
pub use provider::{Message, Provider, ProviderRequest, ProviderResponse, Role};
pub use state::{CanvasSize, RunState};
