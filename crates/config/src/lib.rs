//! Configuration loading, validation, and management for montage.
//!
//! Loads configuration from `~/.montage/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Palette modes understood by the colour-grading hook.
pub const PALETTE_MODES: &[&str] = &["pastel", "vivid", "vintage", "faded"];

/// Analyzer implementations that can be selected by name.
pub const ANALYZER_KINDS: &[&str] = &["passthrough", "region"];

/// The root configuration structure.
///
/// Maps directly to `~/.montage/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key. Without one, only offline capabilities are wired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("pipeline", &self.pipeline)
            .field("discovery", &self.discovery)
            .field("cache", &self.cache)
            .field("analysis", &self.analysis)
            .field("hooks", &self.hooks)
            .field("output", &self.output)
            .finish()
    }
}

/// LLM provider settings. One model per role so cheap calls can use a
/// smaller model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_planner_model")]
    pub planner_model: String,

    #[serde(default = "default_curator_model")]
    pub curator_model: String,

    #[serde(default = "default_fast_model")]
    pub annotator_model: String,

    #[serde(default = "default_fast_model")]
    pub composer_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_planner_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_curator_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_fast_model() -> String {
    "claude-haiku-4-5".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            planner_model: default_planner_model(),
            curator_model: default_curator_model(),
            annotator_model: default_fast_model(),
            composer_model: default_fast_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,

    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,

    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Candidate pool size as a multiple of `max_items`
    #[serde(default = "default_oversample")]
    pub oversample_factor: usize,

    /// Maximum concurrent preview downloads
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_canvas_width() -> u32 {
    1024
}
fn default_canvas_height() -> u32 {
    1024
}
fn default_max_items() -> usize {
    20
}
fn default_oversample() -> usize {
    3
}
fn default_fetch_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            max_items: default_max_items(),
            oversample_factor: default_oversample(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Rows requested per query
    #[serde(default = "default_rows_per_query")]
    pub rows_per_query: usize,

    /// Upper bound on queries accepted from the planner
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_url() -> String {
    "https://archive.org/advancedsearch.php".into()
}
fn default_rows_per_query() -> usize {
    20
}
fn default_max_queries() -> usize {
    6
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            rows_per_query: default_rows_per_query(),
            max_queries: default_max_queries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    AppConfig::config_dir().join("cache").join("previews")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: default_cache_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// One of [`ANALYZER_KINDS`]
    #[serde(default = "default_analyzer")]
    pub analyzer: String,

    /// Regions smaller than this many pixels are discarded
    #[serde(default = "default_min_region_area")]
    pub min_region_area: u64,

    /// Colour distance (0–441) still counted as background
    #[serde(default = "default_background_tolerance")]
    pub background_tolerance: f32,
}

fn default_analyzer() -> String {
    "passthrough".into()
}
fn default_min_region_area() -> u64 {
    500
}
fn default_background_tolerance() -> f32 {
    48.0
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analyzer: default_analyzer(),
            min_region_area: default_min_region_area(),
            background_tolerance: default_background_tolerance(),
        }
    }
}

/// Which bundled hooks to register.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Let the LLM pick a background source (after curation)
    #[serde(default)]
    pub background: bool,

    /// One of [`PALETTE_MODES`] (pre composition)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,

    /// Replace the random compositor with LLM placement
    #[serde(default)]
    pub agentic_composer: bool,

    /// Seed for random placement; unseeded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir() }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.montage/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `MONTAGE_API_KEY`, then `ANTHROPIC_API_KEY`
    /// - `MONTAGE_MODEL` replaces every model slot
    /// - `MONTAGE_CACHE_DIR`, `MONTAGE_OUTPUT_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("MONTAGE_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        }

        if let Some(model) = lookup("MONTAGE_MODEL") {
            self.provider.planner_model = model.clone();
            self.provider.curator_model = model.clone();
            self.provider.annotator_model = model.clone();
            self.provider.composer_model = model;
        }

        if let Some(dir) = lookup("MONTAGE_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("MONTAGE_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".montage")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.pipeline.canvas_width == 0 || self.pipeline.canvas_height == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline canvas dimensions must be positive".into(),
            ));
        }

        if self.pipeline.max_items == 0 {
            return Err(ConfigError::ValidationError("pipeline.max_items must be > 0".into()));
        }

        if self.pipeline.oversample_factor == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.oversample_factor must be >= 1".into(),
            ));
        }

        if self.pipeline.fetch_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.fetch_concurrency must be > 0".into(),
            ));
        }

        if !ANALYZER_KINDS.contains(&self.analysis.analyzer.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "analysis.analyzer '{}' is not one of: {}",
                self.analysis.analyzer,
                ANALYZER_KINDS.join(", ")
            )));
        }

        if let Some(mode) = &self.hooks.palette {
            if !PALETTE_MODES.contains(&mode.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "hooks.palette '{mode}' is not one of: {}",
                    PALETTE_MODES.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            pipeline: PipelineConfig::default(),
            discovery: DiscoveryConfig::default(),
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
            hooks: HooksConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.oversample_factor, 3);
        assert_eq!(config.analysis.analyzer, "passthrough");
        assert!(!config.has_api_key());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pipeline.max_items, config.pipeline.max_items);
        assert_eq!(parsed.provider.curator_model, config.provider.curator_model);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_pipeline_values_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.max_items = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.canvas_height = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.fetch_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_palette_rejected() {
        let mut config = AppConfig::default();
        config.hooks.palette = Some("neon".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("neon"));

        config.hooks.palette = Some("vintage".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_analyzer_rejected() {
        let mut config = AppConfig::default();
        config.analysis.analyzer = "sam".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.pipeline.canvas_width, 1024);
    }

    #[test]
    fn load_from_file_parses_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[pipeline]
canvas_width = 1920
canvas_height = 1080
max_items = 8

[hooks]
background = true
palette = "pastel"
seed = 7
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.pipeline.canvas_width, 1920);
        assert_eq!(config.pipeline.max_items, 8);
        assert_eq!(config.pipeline.oversample_factor, 3);
        assert!(config.hooks.background);
        assert_eq!(config.hooks.palette.as_deref(), Some("pastel"));
        assert_eq!(config.hooks.seed, Some(7));
    }

    #[test]
    fn invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pipeline = 3").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("MONTAGE_MODEL", "claude-test"),
            ("MONTAGE_OUTPUT_DIR", "/tmp/collages"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(config.provider.planner_model, "claude-test");
        assert_eq!(config.provider.composer_model, "claude-test");
        assert_eq!(config.output.dir, PathBuf::from("/tmp/collages"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-ant-secret".into()),
            ..AppConfig::default()
        };
        let text = format!("{config:?}");
        assert!(!text.contains("sk-ant-secret"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("oversample_factor"));
        assert!(toml_str.contains("advancedsearch"));
    }
}
