//! Hook registry: extension points in the fixed stage sequence.
//!
//! There are two registration disciplines:
//! - **Additive** hooks mutate `RunState` in place. Every hook registered at a
//!   point runs, in registration order, with no de-duplication.
//! - **Override** hooks replace a stage's default algorithm. A point holds at
//!   most one override; registering again replaces it.
//!
//! Points form a closed enum, so a typo is a compile error or, when parsed
//! from configuration, an `UnknownInsertionPointError`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CapabilityError, CapabilityFailure, Error, Stage, UnknownInsertionPointError};
use crate::model::FinalOutput;
use crate::state::RunState;

/// A named position in the stage sequence where extensions may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// After fragment curation, before annotation (additive)
    AfterCuration,
    /// After annotation, before composition (additive)
    PreComposition,
    /// Replaces the default compositor (override)
    CompositionStrategy,
}

/// Which registration discipline a point accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Additive,
    Override,
}

impl HookPoint {
    pub const ALL: [HookPoint; 3] = [
        HookPoint::AfterCuration,
        HookPoint::PreComposition,
        HookPoint::CompositionStrategy,
    ];

    pub fn kind(self) -> HookKind {
        match self {
            HookPoint::AfterCuration | HookPoint::PreComposition => HookKind::Additive,
            HookPoint::CompositionStrategy => HookKind::Override,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::AfterCuration => "after_curation",
            HookPoint::PreComposition => "pre_composition",
            HookPoint::CompositionStrategy => "composition_strategy",
        }
    }

    fn names_of(kind: Option<HookKind>) -> String {
        Self::ALL
            .iter()
            .filter(|p| kind.is_none_or(|k| p.kind() == k))
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn expect_kind(self, kind: HookKind) -> Result<Self, UnknownInsertionPointError> {
        if self.kind() == kind {
            Ok(self)
        } else {
            Err(UnknownInsertionPointError {
                name: self.as_str().to_string(),
                expected: Self::names_of(Some(kind)),
            })
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = UnknownInsertionPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| UnknownInsertionPointError {
                name: s.to_string(),
                expected: Self::names_of(None),
            })
    }
}

/// An additive extension. Receives the run state and may mutate it.
#[async_trait]
pub trait PipelineHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: &mut RunState) -> Result<(), CapabilityFailure>;
}

/// An override for the composition stage. Its output is used verbatim.
#[async_trait]
pub trait CompositionOverride: Send + Sync {
    fn name(&self) -> &str;

    async fn compose(&self, state: &RunState) -> Result<FinalOutput, CapabilityFailure>;
}

/// Adapts a synchronous closure into a [`PipelineHook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&mut RunState) -> Result<(), CapabilityFailure> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> PipelineHook for FnHook<F>
where
    F: Fn(&mut RunState) -> Result<(), CapabilityFailure> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut RunState) -> Result<(), CapabilityFailure> {
        (self.f)(state)
    }
}

/// Registry of hooks keyed by insertion point.
///
/// Configure it fully before a run starts; it is read-only while
/// `run_additive` / `resolve_override` are being called.
#[derive(Default)]
pub struct HookManager {
    additive: HashMap<HookPoint, Vec<Arc<dyn PipelineHook>>>,
    overrides: HashMap<HookPoint, Arc<dyn CompositionOverride>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an additive hook. Fails if `point` is an override point.
    pub fn register(&mut self, point: HookPoint, hook: Arc<dyn PipelineHook>) -> Result<(), UnknownInsertionPointError> {
        let point = point.expect_kind(HookKind::Additive)?;
        debug!(point = %point, hook = hook.name(), "Registering additive hook");
        self.additive.entry(point).or_default().push(hook);
        Ok(())
    }

    /// Register an additive hook by point name, as read from configuration.
    pub fn register_named(&mut self, point: &str, hook: Arc<dyn PipelineHook>) -> Result<(), UnknownInsertionPointError> {
        self.register(point.parse()?, hook)
    }

    /// Store the override for `point`, replacing any previous one.
    pub fn register_override(
        &mut self,
        point: HookPoint,
        hook: Arc<dyn CompositionOverride>,
    ) -> Result<(), UnknownInsertionPointError> {
        let point = point.expect_kind(HookKind::Override)?;
        if let Some(previous) = self.overrides.insert(point, hook) {
            debug!(point = %point, replaced = previous.name(), "Replaced override hook");
        }
        Ok(())
    }

    /// Run every hook registered at `point`, in registration order.
    ///
    /// The first failing hook aborts the remaining ones and is returned as a
    /// `CapabilityError` tagged with the hook's stage and name.
    pub async fn run_additive(&self, point: HookPoint, state: &mut RunState) -> crate::Result<()> {
        let point = point.expect_kind(HookKind::Additive)?;
        let Some(hooks) = self.additive.get(&point) else {
            return Ok(());
        };

        for hook in hooks {
            let started = Instant::now();
            hook.run(state).await.map_err(|source| {
                Error::Capability(CapabilityError::new(Stage::Hook(point), hook.name(), source))
            })?;
            debug!(
                point = %point,
                hook = hook.name(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Hook executed"
            );
        }
        Ok(())
    }

    /// The override registered for `point`, or `None` to use the default.
    pub fn resolve_override(&self, point: HookPoint) -> Option<Arc<dyn CompositionOverride>> {
        self.overrides.get(&point).cloned()
    }

    /// Whether at least one additive hook is registered at `point`.
    pub fn has_hooks(&self, point: HookPoint) -> bool {
        self.additive.get(&point).is_some_and(|h| !h.is_empty())
    }

    /// Names of the additive hooks at `point`, in execution order.
    pub fn hook_names(&self, point: HookPoint) -> Vec<&str> {
        self.additive
            .get(&point)
            .map(|hooks| hooks.iter().map(|h| h.name()).collect())
            .unwrap_or_default()
    }
}
