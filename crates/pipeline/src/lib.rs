//! # Montage Pipeline
//!
//! The orchestrator. A [`Pipeline`] owns one implementation of every
//! capability plus the hook registry, and [`Pipeline::run`] drives a single
//! prompt through the fixed stage sequence:
//!
//! discovery → source curation → caching → analysis → fragment curation →
//! `after_curation` hooks → background resolution → annotation →
//! `pre_composition` hooks → composition (or the registered override).
//!
//! Stages run strictly one after another against a [`RunState`] that lives
//! for exactly one run. Only preview fetching fans out.
//!
//! [`RunState`]: montage_core::RunState

pub mod builder;
pub mod orchestrator;
pub mod selection;

pub use builder::PipelineBuilder;
pub use orchestrator::{Pipeline, RunOutcome};
pub use selection::{dedupe_candidates, resolve_selection};
