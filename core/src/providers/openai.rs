use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{or_no_content, send_json, CallError, Provider, ProviderAdapter};

/// OpenAI-style `chat/completions`.
pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn invoke(
        &self,
        api_key: &SecretString,
        model: &str,
        prompt: &str,
    ) -> Result<String, CallError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(url)
            .bearer_auth(api_key.expose_secret())
            .json(&payload);
        let body = send_json(Provider::OpenAi, request).await?;
        Ok(or_no_content(extract_text(&body)))
    }
}

fn extract_text(body: &Value) -> String {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|val| val.as_str())
        .unwrap_or_default()
        .to_string()
}
