//! LLM provider implementations for montage.
//!
//! All providers implement the `montage_core::Provider` trait.

pub mod anthropic;

pub use anthropic::AnthropicProvider;

use std::sync::Arc;

use montage_config::AppConfig;
use montage_core::Provider;

/// Build the provider described by configuration.
///
/// Returns `None` when no API key is configured, in which case the caller
/// wires offline capabilities only.
pub fn build_from_config(config: &AppConfig) -> Option<Arc<dyn Provider>> {
    let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;

    let mut provider = AnthropicProvider::new(api_key)
        .with_temperature(config.provider.temperature)
        .with_max_tokens(config.provider.max_tokens);
    if let Some(url) = &config.provider.api_url {
        provider = provider.with_base_url(url);
    }

    tracing::debug!(provider = provider.name(), "Provider configured");
    Some(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_api_key_means_no_provider() {
        let config = AppConfig::default();
        assert!(build_from_config(&config).is_none());

        let config = AppConfig {
            api_key: Some("   ".into()),
            ..AppConfig::default()
        };
        assert!(build_from_config(&config).is_none());
    }

    #[test]
    fn api_key_builds_anthropic() {
        let config = AppConfig {
            api_key: Some("sk-ant-test".into()),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }
}
