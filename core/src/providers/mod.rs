//! Provider adapters: one per upstream API, all behind [`ProviderAdapter`].
//!
//! An adapter turns `(key, model, prompt)` into exactly one HTTP request and
//! pulls the first text completion back out of the provider's response shape.
//! Nothing here retries or streams.

pub mod anthropic;
pub mod catalog;
pub mod gemini;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;

pub use anthropic::AnthropicAdapter;
pub use catalog::{Provider, ProviderSeed, PROVIDER_SEEDS};
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

use crate::config::ProviderDefaults;
use crate::credentials::ProviderCredential;

/// Returned in place of text when a successful response carries none.
pub const NO_CONTENT: &str = "[no content]";

/// Failure of a single account's call. Always folded into a result entry.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{provider} key not set")]
    MissingCredential { provider: &'static str },
    #[error("{provider} key could not be decrypted")]
    UnreadableCredential { provider: &'static str },
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
    #[error("{provider} HTTP {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned a body that is not JSON: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("dispatch task failed: {0}")]
    Task(String),
}

impl CallError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential { .. } => "CRED-1001",
            Self::UnreadableCredential { .. } => "CRED-1002",
            Self::UnknownAccount(_) => "ACC-1001",
            Self::Http { .. } => "PRV-1001",
            Self::Transport { .. } => "PRV-1002",
            Self::Decode { .. } => "PRV-1003",
            Self::Task(_) => "GEN-1001",
        }
    }
}

/// "Given a key, a model and a prompt, produce text or fail."
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Issue the request. Callers go through [`ProviderAdapter::complete`],
    /// which guarantees a key is present.
    async fn invoke(
        &self,
        api_key: &SecretString,
        model: &str,
        prompt: &str,
    ) -> Result<String, CallError>;

    /// Short-circuits without touching the network when the credential has
    /// no usable key.
    async fn complete(
        &self,
        credential: &ProviderCredential,
        prompt: &str,
    ) -> Result<String, CallError> {
        let api_key = credential.require_key(self.provider())?;
        self.invoke(api_key, &credential.model, prompt).await
    }
}

/// Adapters keyed by provider.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Registry with the three built-in adapters sharing one HTTP client.
    pub fn new(client: Client, defaults: &ProviderDefaults) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(OpenAiAdapter::new(
            client.clone(),
            defaults.base_url(Provider::OpenAi),
        )));
        registry.register(Arc::new(AnthropicAdapter::new(
            client.clone(),
            defaults.base_url(Provider::Anthropic),
        )));
        registry.register(Arc::new(GeminiAdapter::new(
            client,
            defaults.base_url(Provider::Gemini),
        )));
        registry
    }

    /// Replaces any adapter already registered for the same provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("Multiprompt/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to construct HTTP client")
}

/// Sends one request and returns the parsed JSON body of a 2xx response.
pub(crate) async fn send_json(provider: Provider, request: RequestBuilder) -> Result<Value, CallError> {
    let name = provider.display_name();
    let response = request
        .send()
        .await
        .map_err(|source| CallError::Transport { provider: name, source })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| CallError::Transport { provider: name, source })?;
    if !status.is_success() {
        return Err(CallError::Http {
            provider: name,
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|source| CallError::Decode { provider: name, source })
}

pub(crate) fn or_no_content(text: String) -> String {
    if text.is_empty() {
        NO_CONTENT.to_string()
    } else {
        text
    }
}
