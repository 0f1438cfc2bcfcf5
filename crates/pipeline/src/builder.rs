use std::sync::Arc;

use montage_core::{
    Analyzer, Annotator, AssetCache, CompositionOverride, Compositor, DiscoveryAgent, DiscoveryBackend, Error,
    EventBus, HookManager, HookPoint, PipelineHook, Result, Selector,
};

use crate::orchestrator::Pipeline;

pub const DEFAULT_OVERSAMPLE_FACTOR: usize = 3;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Assembles a [`Pipeline`]. Every capability is required; hooks and the
/// event bus are optional.
pub struct PipelineBuilder {
    discovery_agent: Option<Arc<dyn DiscoveryAgent>>,
    backend: Option<Arc<dyn DiscoveryBackend>>,
    source_selector: Option<Arc<dyn Selector>>,
    fragment_selector: Option<Arc<dyn Selector>>,
    cache: Option<Arc<dyn AssetCache>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    annotator: Option<Arc<dyn Annotator>>,
    compositor: Option<Arc<dyn Compositor>>,
    hooks: HookManager,
    event_bus: Option<Arc<EventBus>>,
    oversample_factor: usize,
    fetch_concurrency: usize,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            discovery_agent: None,
            backend: None,
            source_selector: None,
            fragment_selector: None,
            cache: None,
            analyzer: None,
            annotator: None,
            compositor: None,
            hooks: HookManager::new(),
            event_bus: None,
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    pub fn with_discovery_agent(mut self, agent: Arc<dyn DiscoveryAgent>) -> Self {
        self.discovery_agent = Some(agent);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use one selector for both source and fragment curation.
    pub fn with_selector(self, selector: Arc<dyn Selector>) -> Self {
        self.with_source_selector(selector.clone()).with_fragment_selector(selector)
    }

    pub fn with_source_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.source_selector = Some(selector);
        self
    }

    pub fn with_fragment_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.fragment_selector = Some(selector);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn AssetCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_compositor(mut self, compositor: Arc<dyn Compositor>) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// Replace the hook registry wholesale.
    pub fn with_hooks(mut self, hooks: HookManager) -> Self {
        self.hooks = hooks;
        self
    }

    /// Append an additive hook at `point`.
    pub fn with_hook(mut self, point: HookPoint, hook: Arc<dyn PipelineHook>) -> Result<Self> {
        self.hooks.register(point, hook)?;
        Ok(self)
    }

    /// Install the composition override, replacing any earlier one.
    pub fn with_composition_override(mut self, hook: Arc<dyn CompositionOverride>) -> Result<Self> {
        self.hooks.register_override(HookPoint::CompositionStrategy, hook)?;
        Ok(self)
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_oversample_factor(mut self, factor: usize) -> Self {
        self.oversample_factor = factor;
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        if self.oversample_factor == 0 {
            return Err(config_error("oversample factor must be at least 1"));
        }
        if self.fetch_concurrency == 0 {
            return Err(config_error("fetch concurrency must be at least 1"));
        }

        Ok(Pipeline {
            discovery_agent: require(self.discovery_agent, "discovery agent")?,
            backend: require(self.backend, "discovery backend")?,
            source_selector: require(self.source_selector, "source selector")?,
            fragment_selector: require(self.fragment_selector, "fragment selector")?,
            cache: require(self.cache, "asset cache")?,
            analyzer: require(self.analyzer, "analyzer")?,
            annotator: require(self.annotator, "annotator")?,
            compositor: require(self.compositor, "compositor")?,
            hooks: self.hooks,
            event_bus: self.event_bus.unwrap_or_default(),
            oversample_factor: self.oversample_factor,
            fetch_concurrency: self.fetch_concurrency,
        })
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
    }
}

fn require<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| config_error(format!("pipeline has no {what} configured")))
}
