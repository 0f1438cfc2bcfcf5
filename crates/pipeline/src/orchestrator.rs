//! The run loop.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::RgbaImage;
use montage_core::{
    Analyzer, Annotator, AssetCache, CapabilityError, CapabilityFailure, Compositor, DiscoveryAgent, DiscoveryBackend,
    Error, EventBus, FinalOutput, HookManager, HookPoint, PipelineEvent, Result, RunState, SelectionCandidate,
    Selector, SourceItem, Stage, ValidationError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builder::PipelineBuilder;
use crate::selection::{dedupe_candidates, resolve_selection, take_selected};

/// The result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// The composed collage, with provenance for every placed fragment
    pub output: FinalOutput,
    /// The curated sources, with their cached preview paths
    pub sources: Vec<SourceItem>,
}

/// Drives one prompt through every stage, in a fixed order.
///
/// A pipeline is built once and can serve any number of runs. Each run gets
/// its own [`RunState`]; nothing is shared between runs except the
/// capabilities and the hook registry, which is read-only while a run is in
/// progress.
pub struct Pipeline {
    pub(crate) discovery_agent: Arc<dyn DiscoveryAgent>,
    pub(crate) backend: Arc<dyn DiscoveryBackend>,
    pub(crate) source_selector: Arc<dyn Selector>,
    pub(crate) fragment_selector: Arc<dyn Selector>,
    pub(crate) cache: Arc<dyn AssetCache>,
    pub(crate) analyzer: Arc<dyn Analyzer>,
    pub(crate) annotator: Arc<dyn Annotator>,
    pub(crate) compositor: Arc<dyn Compositor>,
    pub(crate) hooks: HookManager,
    pub(crate) event_bus: Arc<EventBus>,
    /// Candidate pool size as a multiple of `max_items`
    pub(crate) oversample_factor: usize,
    /// Preview downloads in flight at once
    pub(crate) fetch_concurrency: usize,
}

fn capability(stage: Stage, component: &str, source: CapabilityFailure) -> Error {
    Error::Capability(CapabilityError::new(stage, component, source))
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    /// Register hooks between runs. Holding `&mut self` means no run can be
    /// in progress.
    pub fn hooks_mut(&mut self) -> &mut HookManager {
        &mut self.hooks
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Run the whole pipeline for `prompt`.
    ///
    /// Arguments are validated before any stage runs. Empty candidate pools
    /// and empty selections are not errors: they produce a blank canvas with
    /// no provenance.
    pub async fn run(&self, prompt: &str, canvas_size: (u32, u32), max_items: usize) -> Result<RunOutcome> {
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        let (width, height) = canvas_size;
        let mut state = RunState::with_dimensions(prompt.trim(), width, height)?;
        if max_items == 0 {
            return Err(ValidationError::NonPositiveMaxItems.into());
        }

        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(run_id = %run_id, prompt = state.prompt(), canvas = %state.canvas_size(), max_items, "Run started");
        self.event_bus.publish(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            prompt: state.prompt().to_string(),
            timestamp: Utc::now(),
        });

        match self.execute(&run_id, &mut state, max_items).await {
            Ok(output) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    run_id = %run_id,
                    sources = state.sources.len(),
                    fragments = output.provenance.len(),
                    duration_ms,
                    "Run completed"
                );
                self.event_bus.publish(PipelineEvent::RunCompleted {
                    run_id: run_id.clone(),
                    fragments_placed: output.provenance.len(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(RunOutcome {
                    run_id,
                    output,
                    sources: state.sources,
                })
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Run failed");
                self.event_bus.publish(PipelineEvent::RunFailed {
                    run_id,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, run_id: &str, state: &mut RunState, max_items: usize) -> Result<FinalOutput> {
        // Discovery
        let clock = self.stage_started(run_id, Stage::Discovery);
        let plan = self
            .discovery_agent
            .plan(state.prompt())
            .await
            .map_err(|e| capability(Stage::Discovery, self.discovery_agent.name(), e))?;
        debug!(queries = plan.queries.len(), agent = self.discovery_agent.name(), "Query plan ready");

        let pool_size = max_items.saturating_mul(self.oversample_factor);
        let candidates = self
            .backend
            .execute(&plan, pool_size)
            .await
            .map_err(|e| capability(Stage::Discovery, self.backend.name(), e))?;
        let candidates = dedupe_candidates(candidates);
        self.stage_completed(run_id, Stage::Discovery, clock, candidates.len());

        // Source curation
        let clock = self.stage_started(run_id, Stage::SourceCuration);
        let listing: Vec<SelectionCandidate> = candidates.iter().map(SelectionCandidate::from).collect();
        let picked = self
            .select(self.source_selector.as_ref(), Stage::SourceCuration, state.prompt(), &listing, max_items)
            .await?;
        state.sources = take_selected(candidates, &picked)
            .into_iter()
            .map(SourceItem::from)
            .collect();
        self.stage_completed(run_id, Stage::SourceCuration, clock, state.sources.len());

        // Caching
        let clock = self.stage_started(run_id, Stage::Caching);
        let paths = self.cache_previews(&state.sources).await?;
        for (source, path) in state.sources.iter_mut().zip(paths) {
            source.local_path = Some(path);
        }
        self.stage_completed(run_id, Stage::Caching, clock, state.sources.len());

        // Analysis
        let clock = self.stage_started(run_id, Stage::Analysis);
        state.fragments = self
            .analyzer
            .analyze(&state.sources)
            .await
            .map_err(|e| capability(Stage::Analysis, self.analyzer.name(), e))?;
        check_fragments(state).map_err(|e| capability(Stage::Analysis, self.analyzer.name(), e))?;
        self.stage_completed(run_id, Stage::Analysis, clock, state.fragments.len());

        // Fragment curation
        let clock = self.stage_started(run_id, Stage::FragmentCuration);
        let listing: Vec<SelectionCandidate> = state.fragments.iter().map(SelectionCandidate::from).collect();
        let picked = self
            .select(self.fragment_selector.as_ref(), Stage::FragmentCuration, state.prompt(), &listing, max_items)
            .await?;
        state.fragments = take_selected(std::mem::take(&mut state.fragments), &picked);
        self.stage_completed(run_id, Stage::FragmentCuration, clock, state.fragments.len());

        self.run_hooks(run_id, HookPoint::AfterCuration, state).await?;
        let mut resolved_background = None;
        self.resolve_background(run_id, state, &mut resolved_background).await?;

        // Annotation
        let clock = self.stage_started(run_id, Stage::Annotation);
        self.annotator
            .annotate(&state.sources, &mut state.fragments)
            .await
            .map_err(|e| capability(Stage::Annotation, self.annotator.name(), e))?;
        self.stage_completed(run_id, Stage::Annotation, clock, state.fragments.len());

        self.run_hooks(run_id, HookPoint::PreComposition, state).await?;
        // Pre-composition hooks may have changed the background
        self.resolve_background(run_id, state, &mut resolved_background).await?;

        // Composition
        let clock = self.stage_started(run_id, Stage::Composition);
        let output = match self.hooks.resolve_override(HookPoint::CompositionStrategy) {
            Some(strategy) => {
                debug!(strategy = strategy.name(), "Composing with override");
                strategy
                    .compose(state)
                    .await
                    .map_err(|e| capability(Stage::Composition, strategy.name(), e))?
            }
            None => self
                .compositor
                .compose(&state.fragments, state.canvas_size(), state.background_image.as_ref())
                .map_err(|e| capability(Stage::Composition, self.compositor.name(), e))?,
        };
        self.stage_completed(run_id, Stage::Composition, clock, output.provenance.len());

        Ok(output)
    }

    /// Ask `selector` for at most `limit` ids and map the reply back onto
    /// `listing`. The selector is never trusted on validity or size.
    async fn select(
        &self,
        selector: &dyn Selector,
        stage: Stage,
        prompt: &str,
        listing: &[SelectionCandidate],
        limit: usize,
    ) -> Result<Vec<usize>> {
        let chosen = selector
            .select(prompt, listing, limit)
            .await
            .map_err(|e| capability(stage, selector.name(), e))?;
        let picked = resolve_selection(listing, &chosen, limit);
        debug!(
            stage = %stage,
            selector = selector.name(),
            offered = listing.len(),
            returned = chosen.len(),
            kept = picked.len(),
            "Selection applied"
        );
        Ok(picked)
    }

    /// Resolve a cached preview for every source, with bounded fan-out.
    /// Results come back in source order.
    async fn cache_previews(&self, sources: &[SourceItem]) -> Result<Vec<PathBuf>> {
        let cache = &self.cache;
        stream::iter(sources)
            .map(|source| async move { cache.get_or_fetch(&source.id, &source.preview_url).await })
            .buffered(self.fetch_concurrency)
            .try_collect::<Vec<PathBuf>>()
            .await
            .map_err(|e| capability(Stage::Caching, "asset_cache", e))
    }

    async fn run_hooks(&self, run_id: &str, point: HookPoint, state: &mut RunState) -> Result<()> {
        if !self.hooks.has_hooks(point) {
            return Ok(());
        }
        let stage = Stage::Hook(point);
        let clock = self.stage_started(run_id, stage);
        debug!(point = %point, hooks = ?self.hooks.hook_names(point), "Running hooks");
        self.hooks.run_additive(point, state).await?;
        self.stage_completed(run_id, stage, clock, self.hooks.hook_names(point).len());
        Ok(())
    }

    /// Keep `background_image` in step with `background_source_id`.
    ///
    /// `resolved` is the id the current image was loaded from. The image is
    /// reloaded when the id changes and dropped when the id is cleared; an
    /// unchanged id keeps the image, including edits hooks made to it.
    async fn resolve_background(
        &self,
        run_id: &str,
        state: &mut RunState,
        resolved: &mut Option<String>,
    ) -> Result<()> {
        let Some(id) = state.background_source_id.clone() else {
            if resolved.take().is_some() {
                debug!("Background cleared");
                state.background_image = None;
            }
            return Ok(());
        };
        if resolved.as_deref() == Some(id.as_str()) && state.background_image.is_some() {
            return Ok(());
        }

        let clock = self.stage_started(run_id, Stage::BackgroundResolution);
        let image = load_background(state, &id)
            .await
            .map_err(|e| capability(Stage::BackgroundResolution, "background", e))?;
        debug!(source = %id, width = image.width(), height = image.height(), "Background loaded");
        state.background_image = Some(image);
        *resolved = Some(id);
        self.stage_completed(run_id, Stage::BackgroundResolution, clock, 1);
        Ok(())
    }

    fn stage_started(&self, run_id: &str, stage: Stage) -> Instant {
        debug!(stage = %stage, "Stage started");
        self.event_bus.publish(PipelineEvent::StageStarted {
            run_id: run_id.to_string(),
            stage,
            timestamp: Utc::now(),
        });
        Instant::now()
    }

    fn stage_completed(&self, run_id: &str, stage: Stage, started: Instant, items: usize) {
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(stage = %stage, items, duration_ms, "Stage completed");
        self.event_bus.publish(PipelineEvent::StageCompleted {
            run_id: run_id.to_string(),
            stage,
            items,
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}

/// Fragment ids must be unique and every fragment must come from a
/// curated source.
fn check_fragments(state: &RunState) -> std::result::Result<(), CapabilityFailure> {
    if let Some(id) = state.duplicate_fragment_id() {
        return Err(CapabilityFailure::InvalidOutput(format!("duplicate fragment id '{id}'")));
    }
    let known: HashSet<&str> = state.sources.iter().map(|s| s.id.as_str()).collect();
    if let Some(orphan) = state.fragments.iter().find(|f| !known.contains(f.source_id.as_str())) {
        return Err(CapabilityFailure::InvalidOutput(format!(
            "fragment '{}' references unknown source '{}'",
            orphan.id, orphan.source_id
        )));
    }
    Ok(())
}

async fn load_background(state: &RunState, id: &str) -> std::result::Result<RgbaImage, CapabilityFailure> {
    let source = state.source(id).ok_or_else(|| {
        CapabilityFailure::InvalidOutput(format!("background source '{id}' is not among the curated sources"))
    })?;
    let path = source
        .local_path
        .clone()
        .ok_or_else(|| CapabilityFailure::InvalidOutput(format!("background source '{id}' has no cached preview")))?;

    tokio::task::spawn_blocking(move || montage_analysis::load_rgba(&path))
        .await
        .map_err(|e| CapabilityFailure::Backend(format!("background decode task failed: {e}")))?
}
