//! `montage run`: prompt in, collage directory out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use montage_analysis::{LlmAnnotator, PassthroughAnalyzer, PlaceholderAnnotator, RegionAnalyzer};
use montage_composition::{save_run, AgenticCompositor, BackgroundSelector, PaletteGrader, PaletteMode, RandomCompositor};
use montage_config::AppConfig;
use montage_core::{Analyzer, CanvasSize, HookPoint, Provider};
use montage_curation::{FirstSelector, LlmSelector};
use montage_discovery::{FileAssetCache, InternetArchiveBackend, KeywordQueryPlanner, LlmQueryPlanner};
use montage_pipeline::Pipeline;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The creative prompt, e.g. "vintage botanical illustrations"
    pub prompt: String,

    /// Canvas size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_canvas)]
    pub canvas: Option<(u32, u32)>,

    /// Maximum number of sources to curate
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Colour grade every fragment and the background (pastel, vivid, vintage, faded)
    #[arg(long)]
    pub palette: Option<PaletteMode>,

    /// Let the LLM pick a background source
    #[arg(long)]
    pub background: bool,

    /// Let the LLM place fragments instead of random placement
    #[arg(long)]
    pub agentic: bool,

    /// Fragment extraction strategy (passthrough or region)
    #[arg(long)]
    pub analyzer: Option<String>,

    /// Seed for reproducible placement
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory to write the run into
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Layer the command-line flags over the loaded configuration.
    fn apply(&self, config: &mut AppConfig) {
        if let Some((width, height)) = self.canvas {
            config.pipeline.canvas_width = width;
            config.pipeline.canvas_height = height;
        }
        if let Some(max_items) = self.max_items {
            config.pipeline.max_items = max_items;
        }
        if let Some(mode) = self.palette {
            config.hooks.palette = Some(mode.to_string());
        }
        if self.background {
            config.hooks.background = true;
        }
        if self.agentic {
            config.hooks.agentic_composer = true;
        }
        if let Some(analyzer) = &self.analyzer {
            config.analysis.analyzer = analyzer.clone();
        }
        if self.seed.is_some() {
            config.hooks.seed = self.seed;
        }
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
    }
}

/// Parse `1920x1080` (or `1920X1080`).
pub fn parse_canvas(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Invalid canvas '{s}', expected WIDTHxHEIGHT"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("Invalid canvas width '{w}'"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("Invalid canvas height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("Canvas dimensions must be positive, got {s}"));
    }
    Ok((width, height))
}

fn analyzer_for(config: &AppConfig) -> Arc<dyn Analyzer> {
    match config.analysis.analyzer.as_str() {
        "region" => Arc::new(RegionAnalyzer::new(
            config.analysis.min_region_area,
            config.analysis.background_tolerance,
        )),
        _ => Arc::new(PassthroughAnalyzer),
    }
}

/// Wire every capability and hook from configuration.
///
/// With a provider, planning, curation, and annotation go through the LLM.
/// Without one, the offline implementations are used and the LLM-only
/// hooks are refused.
pub fn build_pipeline(config: &AppConfig, provider: Option<Arc<dyn Provider>>) -> CliResult<Pipeline> {
    let models = &config.provider;

    let mut builder = Pipeline::builder()
        .with_backend(Arc::new(InternetArchiveBackend::new(
            config.discovery.search_url.clone(),
            config.discovery.rows_per_query,
            Duration::from_secs(config.discovery.timeout_secs),
        )))
        .with_cache(Arc::new(FileAssetCache::http(config.cache.dir.clone())))
        .with_analyzer(analyzer_for(config))
        .with_compositor(Arc::new(match config.hooks.seed {
            Some(seed) => RandomCompositor::seeded(seed),
            None => RandomCompositor::new(),
        }))
        .with_oversample_factor(config.pipeline.oversample_factor)
        .with_fetch_concurrency(config.pipeline.fetch_concurrency);

    builder = match &provider {
        Some(provider) => builder
            .with_discovery_agent(Arc::new(LlmQueryPlanner::new(
                provider.clone(),
                models.planner_model.clone(),
                config.discovery.max_queries,
            )))
            .with_source_selector(Arc::new(
                LlmSelector::new(provider.clone(), models.curator_model.clone()).with_name("source_curator"),
            ))
            .with_fragment_selector(Arc::new(
                LlmSelector::new(provider.clone(), models.curator_model.clone()).with_name("fragment_curator"),
            ))
            .with_annotator(Arc::new(LlmAnnotator::new(provider.clone(), models.annotator_model.clone()))),
        None => builder
            .with_discovery_agent(Arc::new(KeywordQueryPlanner))
            .with_selector(Arc::new(FirstSelector))
            .with_annotator(Arc::new(PlaceholderAnnotator)),
    };

    if config.hooks.background {
        let provider = provider
            .as_ref()
            .ok_or("Background selection needs an API key (set MONTAGE_API_KEY or ANTHROPIC_API_KEY)")?;
        builder = builder.with_hook(
            HookPoint::AfterCuration,
            Arc::new(BackgroundSelector::new(provider.clone(), models.composer_model.clone())),
        )?;
    }

    if let Some(mode) = &config.hooks.palette {
        let mode: PaletteMode = mode.parse()?;
        builder = builder.with_hook(HookPoint::PreComposition, Arc::new(PaletteGrader::new(mode)))?;
    }

    if config.hooks.agentic_composer {
        let provider = provider
            .as_ref()
            .ok_or("Agentic composition needs an API key (set MONTAGE_API_KEY or ANTHROPIC_API_KEY)")?;
        builder = builder.with_composition_override(Arc::new(
            AgenticCompositor::new(provider.clone(), models.composer_model.clone()).with_seed(config.hooks.seed),
        ))?;
    }

    Ok(builder.build()?)
}

pub async fn run(args: RunArgs) -> CliResult<()> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    args.apply(&mut config);
    config.validate()?;

    let provider = montage_providers::build_from_config(&config);
    if provider.is_none() {
        warn!("No API key configured, using the keyword planner, first-N selector, and placeholder annotator");
    }
    let pipeline = build_pipeline(&config, provider)?;

    let (width, height) = (config.pipeline.canvas_width, config.pipeline.canvas_height);
    println!("🎨 montage: \"{}\" on a {width}x{height} canvas", args.prompt);

    let outcome = pipeline.run(&args.prompt, (width, height), config.pipeline.max_items).await?;

    let canvas = CanvasSize::new(width, height)?;
    let run_dir = save_run(&outcome.output, &outcome.sources, &args.prompt, canvas, &config.output.dir)?;
    info!(run_id = %outcome.run_id, dir = %run_dir.display(), "Collage written");

    println!();
    println!("   Sources:   {}", outcome.sources.len());
    println!("   Fragments: {}", outcome.output.provenance.len());
    for entry in &outcome.output.provenance {
        println!("     • {} ({}) from {}", entry.fragment_id, entry.label, entry.source_id);
    }
    println!();
    println!("✅ Saved to {}", run_dir.display());

    Ok(())
}
