use serde::{Deserialize, Serialize};

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
}

/// Static metadata for a provider: display name, defaults and the
/// environment variables that carry process-wide fallbacks.
#[derive(Debug)]
pub struct ProviderSeed {
    pub provider: Provider,
    pub id: &'static str,
    pub display: &'static str,
    pub default_model: &'static str,
    pub base_url: &'static str,
    pub key_env: &'static str,
    pub model_env: &'static str,
    pub base_url_env: &'static str,
}

pub const PROVIDER_SEEDS: &[ProviderSeed] = &[
    ProviderSeed {
        provider: Provider::OpenAi,
        id: "openai",
        display: "OpenAI",
        default_model: "gpt-4o-mini",
        base_url: "https://api.openai.com/v1",
        key_env: "OPENAI_API_KEY_1",
        model_env: "OPENAI_MODEL_1",
        base_url_env: "OPENAI_BASE_URL",
    },
    ProviderSeed {
        provider: Provider::Anthropic,
        id: "anthropic",
        display: "Anthropic",
        default_model: "claude-3-5-sonnet-latest",
        base_url: "https://api.anthropic.com/v1",
        key_env: "ANTHROPIC_API_KEY_1",
        model_env: "ANTHROPIC_MODEL_1",
        base_url_env: "ANTHROPIC_BASE_URL",
    },
    ProviderSeed {
        provider: Provider::Gemini,
        id: "gemini",
        display: "Gemini",
        default_model: "gemini-1.5-pro-latest",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        key_env: "GEMINI_API_KEY_1",
        model_env: "GEMINI_MODEL_1",
        base_url_env: "GEMINI_BASE_URL",
    },
];

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Gemini];

    pub fn seed(self) -> &'static ProviderSeed {
        match self {
            Provider::OpenAi => &PROVIDER_SEEDS[0],
            Provider::Anthropic => &PROVIDER_SEEDS[1],
            Provider::Gemini => &PROVIDER_SEEDS[2],
        }
    }

    pub fn id(self) -> &'static str {
        self.seed().id
    }

    pub fn display_name(self) -> &'static str {
        self.seed().display
    }

    pub fn default_model(self) -> &'static str {
        self.seed().default_model
    }

    pub fn from_id(id: &str) -> Option<Self> {
        PROVIDER_SEEDS.iter().find(|s| s.id == id).map(|s| s.provider)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
