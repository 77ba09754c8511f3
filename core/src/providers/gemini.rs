use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{or_no_content, send_json, CallError, Provider, ProviderAdapter};

/// Gemini-style `models/{model}:generateContent`.
pub struct GeminiAdapter {
    client: Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn invoke(
        &self,
        api_key: &SecretString,
        model: &str,
        prompt: &str,
    ) -> Result<String, CallError> {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(model)
        );
        let payload = serde_json::json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": prompt }]
                }
            ]
        });
        let request = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&payload);
        let body = send_json(Provider::Gemini, request).await?;
        Ok(or_no_content(extract_text(&body)))
    }
}

/// Concatenates every text part of the first candidate.
fn extract_text(body: &Value) -> String {
    body.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|cand| cand.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}
