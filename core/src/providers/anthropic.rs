use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{or_no_content, send_json, CallError, Provider, ProviderAdapter};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Anthropic-style `messages`.
pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn invoke(
        &self,
        api_key: &SecretString,
        model: &str,
        prompt: &str,
    ) -> Result<String, CallError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);
        let body = send_json(Provider::Anthropic, request).await?;
        Ok(or_no_content(extract_text(&body)))
    }
}

fn extract_text(body: &Value) -> String {
    body.get("content")
        .and_then(|c| c.get(0))
        .and_then(|part| part.get("text"))
        .and_then(|text| text.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_first_content_block() {
        let body = json!({
            "content": [{ "type": "text", "text": "Bonjour" }],
            "stop_reason": "end_turn"
        });
        assert_eq!(extract_text(&body), "Bonjour");
    }

    #[test]
    fn non_text_first_block_yields_empty() {
        let body = json!({ "content": [{ "type": "tool_use", "id": "t1" }] });
        assert_eq!(extract_text(&body), "");
    }
}
