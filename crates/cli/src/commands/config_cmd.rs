//! `montage config`: Configuration inspection commands.

use montage_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set MONTAGE_API_KEY or ANTHROPIC_API_KEY); offline components will be used");
            }
            if !config.has_api_key() && (config.hooks.background || config.hooks.agentic_composer) {
                warnings.push("Background selection and agentic composition need an API key");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!(
                "   Canvas:    {}x{}",
                config.pipeline.canvas_width, config.pipeline.canvas_height
            );
            println!("   Max items: {}", config.pipeline.max_items);
            println!("   Planner:   {}", config.provider.planner_model);
            println!("   Curator:   {}", config.provider.curator_model);
            println!("   Analyzer:  {}", config.analysis.analyzer);
            println!("   Palette:   {}", config.hooks.palette.as_deref().unwrap_or("none"));
            println!("   Cache:     {}", config.cache.dir.display());
            println!("   Output:    {}", config.output.dir.display());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", render_redacted(&config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// The config as TOML, with the API key masked.
fn render_redacted(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&shown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn show_masks_the_api_key() {
        let config = AppConfig {
            api_key: Some("sk-ant-secret".into()),
            ..AppConfig::default()
        };
        let text = render_redacted(&config).unwrap();
        assert!(!text.contains("sk-ant-secret"));
        assert!(text.contains("[REDACTED]"));
    }
}
