//! Process configuration read from the environment (and an optional `.env`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use secrecy::SecretString;

use crate::providers::Provider;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_TTL_HOURS: i64 = 7 * 24;
/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 10 * 366 * 24;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Process-wide fallback for one provider.
#[derive(Debug, Default)]
pub struct ProviderEnv {
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Fallback credentials, model names and endpoints for every provider.
#[derive(Debug, Default)]
pub struct ProviderDefaults {
    entries: HashMap<Provider, ProviderEnv>,
}

impl ProviderDefaults {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut defaults = Self::default();
        for provider in Provider::ALL {
            let seed = provider.seed();
            defaults.entries.insert(
                provider,
                ProviderEnv {
                    api_key: lookup(seed.key_env).map(SecretString::from),
                    model: lookup(seed.model_env),
                    base_url: lookup(seed.base_url_env),
                },
            );
        }
        defaults
    }

    pub fn with(mut self, provider: Provider, env: ProviderEnv) -> Self {
        self.entries.insert(provider, env);
        self
    }

    pub fn api_key(&self, provider: Provider) -> Option<&SecretString> {
        self.entries.get(&provider).and_then(|e| e.api_key.as_ref())
    }

    /// Environment model, else the provider's built-in default.
    pub fn model(&self, provider: Provider) -> &str {
        self.entries
            .get(&provider)
            .and_then(|e| e.model.as_deref())
            .unwrap_or_else(|| provider.default_model())
    }

    pub fn base_url(&self, provider: Provider) -> &str {
        self.entries
            .get(&provider)
            .and_then(|e| e.base_url.as_deref())
            .unwrap_or(provider.seed().base_url)
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub encryption_key: SecretString,
    pub admin_user: String,
    pub admin_pass: SecretString,
    pub session_ttl: time::Duration,
    pub cookie_secure: bool,
    pub http_timeout: Duration,
    pub providers: ProviderDefaults,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().with_context(|| format!("invalid PORT {raw:?}"))?,
            None => DEFAULT_PORT,
        };
        let session_hours = match get("SESSION_TTL_HOURS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid SESSION_TTL_HOURS {raw:?}"))?,
            None => DEFAULT_SESSION_TTL_HOURS,
        };
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_hours) {
            bail!("SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}, got {session_hours}");
        }
        let timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid HTTP_TIMEOUT_SECS {raw:?}"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let encryption_key = get("ENCRYPTION_KEY").unwrap_or_else(|| {
            log::warn!("ENCRYPTION_KEY is not set; stored keys are protected by a well-known key");
            String::new()
        });

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(raw) => matches!(raw.trim(), "1" | "true" | "yes"),
            None => get("NODE_ENV").as_deref() == Some("production"),
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(default_data_dir),
            public_dir: get("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            encryption_key: SecretString::from(encryption_key),
            admin_user: get("ADMIN_USER").unwrap_or_else(|| "admin".to_string()),
            admin_pass: SecretString::from(
                get("ADMIN_PASS").unwrap_or_else(|| "admin123!".to_string()),
            ),
            session_ttl: time::Duration::hours(session_hours),
            cookie_secure,
            http_timeout: Duration::from_secs(timeout_secs),
            providers: ProviderDefaults::from_lookup(get),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("com", "Multiprompt", "Multiprompt") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("Multiprompt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.admin_user, "admin");
        assert_eq!(config.session_ttl, time::Duration::days(7));
        assert!(!config.cookie_secure);
        assert_eq!(config.providers.model(Provider::Gemini), "gemini-1.5-pro-latest");
        assert!(config.providers.api_key(Provider::OpenAi).is_none());
    }

    #[test]
    fn provider_fallbacks_are_read_per_provider() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY_1", "sk-env"),
            ("OPENAI_MODEL_1", "gpt-4.1"),
            ("ANTHROPIC_API_KEY_1", "  "),
            ("GEMINI_BASE_URL", "http://localhost:9000"),
        ]))
        .unwrap();
        let providers = &config.providers;
        assert_eq!(
            providers.api_key(Provider::OpenAi).unwrap().expose_secret(),
            "sk-env"
        );
        assert_eq!(providers.model(Provider::OpenAi), "gpt-4.1");
        assert!(providers.api_key(Provider::Anthropic).is_none());
        assert_eq!(providers.base_url(Provider::Gemini), "http://localhost:9000");
        assert_eq!(providers.base_url(Provider::Anthropic), "https://api.anthropic.com/v1");
    }

    #[test]
    fn production_marks_cookies_secure() {
        let config = AppConfig::from_lookup(lookup(&[("NODE_ENV", "production")])).unwrap();
        assert!(config.cookie_secure);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn session_ttl_must_be_in_range() {
        for raw in ["0", "-3", "100000000"] {
            let err = AppConfig::from_lookup(move |key: &str| {
                (key == "SESSION_TTL_HOURS").then(|| raw.to_string())
            })
            .unwrap_err();
            assert!(err.to_string().contains("SESSION_TTL_HOURS"), "{raw}: {err}");
        }
        let config = AppConfig::from_lookup(lookup(&[("SESSION_TTL_HOURS", "87840")])).unwrap();
        assert_eq!(config.session_ttl, time::Duration::hours(87840));
    }
}
