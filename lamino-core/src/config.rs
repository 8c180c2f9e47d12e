use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::providers::Provider;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LaminoConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sso: SsoConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8790,
        }
    }
}

/// Identity provider settings.
///
/// Leaving `client_secret` unset puts the gateway in development mode: every
/// request resolves to a fixed developer identity without contacting the
/// provider.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SsoConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub callback_url: String,
    pub cookie_name: String,
    pub user_cookie_name: String,
    pub cookie_max_age_secs: u64,
    pub verify_timeout_secs: u64,
    pub default_return_to: String,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            issuer: "https://login.orcest.ai".to_string(),
            client_id: "lamino".to_string(),
            client_secret: None,
            callback_url: "https://llm.orcest.ai/auth/callback".to_string(),
            cookie_name: "lamino_sso_token".to_string(),
            user_cookie_name: "lamino_user_info".to_string(),
            cookie_max_age_secs: 86_400,
            verify_timeout_secs: 10,
            default_return_to: "/lamino".to_string(),
        }
    }
}

impl SsoConfig {
    /// The configured client secret, treating an empty string as unset.
    pub fn secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn dev_mode(&self) -> bool {
        self.secret().is_none()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub history_window: usize,
    pub request_timeout_secs: u64,
    pub error_body_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            request_timeout_secs: 120,
            error_body_limit: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilesConfig {
    pub max_file_size: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderEndpointConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub rainymodel: ProviderEndpointConfig,
    pub openrouter: ProviderEndpointConfig,
    pub ollamafreeapi: ProviderEndpointConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            rainymodel: ProviderEndpointConfig {
                base_url: "https://rm.orcest.ai/v1".to_string(),
                api_key_env: "RAINYMODEL_MASTER_KEY".to_string(),
            },
            openrouter: ProviderEndpointConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key_env: "OPENROUTER_API_KEY".to_string(),
            },
            ollamafreeapi: ProviderEndpointConfig {
                base_url: "https://ollamafreeapi.orcest.ai".to_string(),
                api_key_env: "OLLAMAFREE_API_KEY".to_string(),
            },
        }
    }
}

impl ProvidersConfig {
    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpointConfig {
        match provider {
            Provider::RainyModel => &self.rainymodel,
            Provider::OpenRouter => &self.openrouter,
            Provider::OllamaFreeApi => &self.ollamafreeapi,
        }
    }
}

impl LaminoConfig {
    /// Load from an optional TOML file, then apply `LAMINO__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LAMINO")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        s.try_deserialize()
    }
}
