//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field

use async_trait::async_trait;
use montage_core::error::ProviderError;
use montage_core::provider::{Message, Provider, ProviderRequest, ProviderResponse, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    /// Overrides the per-request temperature when set
    temperature: Option<f32>,
    /// Upper bound for `max_tokens`; also the value used when a request has none
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            client,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|msg| AnthropicMessage {
                role: match msg.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }

    fn build_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let max_tokens = request.max_tokens.map_or(self.max_tokens, |n| n.min(self.max_tokens));
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": max_tokens,
            "temperature": self.temperature.unwrap_or(request.temperature),
        });

        if let Some(ref sys) = request.system {
            body["system"] = serde_json::json!(sys);
        }

        body
    }

    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text = String::new();
        for block in resp.content {
            if let ResponseContentBlock::Text { text: part } = block {
                text.push_str(&part);
            }
        }

        ProviderResponse {
            text,
            model: resp.model,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        Ok(Self::response_to_provider_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn body_carries_system_as_top_level_field() {
        let request = ProviderRequest::single("claude-test", "You pick images", "botanical").with_max_tokens(256);
        let body = AnthropicProvider::new("k").build_body(&request);

        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["system"], "You pick images");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "botanical");
    }

    #[test]
    fn body_defaults_max_tokens() {
        let mut request = ProviderRequest::single("m", "s", "u");
        request.system = None;
        let body = AnthropicProvider::new("k").build_body(&request);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn configured_limits_apply_to_every_request() {
        let provider = AnthropicProvider::new("k").with_temperature(0.25).with_max_tokens(512);

        let body = provider.build_body(&ProviderRequest::single("m", "s", "u").with_max_tokens(4096));
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["temperature"], 0.25);

        let body = provider.build_body(&ProviderRequest::single("m", "s", "u").with_max_tokens(128));
        assert_eq!(body["max_tokens"], 128);
    }

    #[test]
    fn response_parsing_concatenates_text_blocks() {
        let json = r#"{
            "id": "msg_1",
            "model": "claude-test",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "[\"vintage bot"},
                {"type": "text", "text": "anical\", \"b\"]"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let resp: AnthropicResponse = serde_json::from_str(json).unwrap();
        let result = AnthropicProvider::response_to_provider_response(resp);
        assert_eq!(result.model, "claude-test");
        assert_eq!(result.text, "[\"vintage botanical\", \"b\"]");
        let ids: Vec<String> = serde_json::from_str(&result.text).unwrap();
        assert_eq!(ids, vec!["vintage botanical", "b"]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = AnthropicProvider::new("sk-ant-test").with_base_url("http://127.0.0.1:1");
        let err = provider
            .complete(ProviderRequest::single("m", "s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_) | ProviderError::Timeout(_)));
    }
}
