//! Provider catalogue and upstream registry
//!
//! The set of providers is closed. Each variant carries static catalogue
//! metadata (display name, model list) while its base URL and credential
//! source come from configuration. The [`ProviderRegistry`] binds every
//! provider to a [`ChatUpstream`] implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::ProvidersConfig;
use crate::error::LaminoError;
use crate::upstream::{ChatUpstream, OpenAiCompatibleClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    #[default]
    RainyModel,
    OpenRouter,
    OllamaFreeApi,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

const fn model(id: &'static str, name: &'static str) -> ModelInfo {
    ModelInfo {
        id,
        name,
        description: None,
        default: false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub requires_key: bool,
    pub models: &'static [ModelInfo],
}

const RAINYMODEL_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "rainymodel/auto",
        name: "RainyModel Auto",
        description: Some("Cost-optimized automatic routing"),
        default: true,
    },
    ModelInfo {
        id: "rainymodel/chat",
        name: "RainyModel Chat",
        description: Some("Optimized for conversation"),
        default: false,
    },
    ModelInfo {
        id: "rainymodel/code",
        name: "RainyModel Code",
        description: Some("Code generation specialist"),
        default: false,
    },
    ModelInfo {
        id: "rainymodel/agent",
        name: "RainyModel Agent",
        description: Some("Complex agent tasks (Premium)"),
        default: false,
    },
];

const OPENROUTER_MODELS: &[ModelInfo] = &[
    model("openrouter/qwen/qwen-2.5-72b-instruct", "Qwen 2.5 72B"),
    model("openrouter/anthropic/claude-sonnet-4", "Claude Sonnet 4"),
    model("openrouter/openai/gpt-4o", "GPT-4o"),
    model("openrouter/google/gemini-2.0-flash-001", "Gemini 2.0 Flash"),
    model("openrouter/meta-llama/llama-3.1-70b-instruct", "LLaMA 3.1 70B"),
];

const OLLAMAFREE_MODELS: &[ModelInfo] = &[
    model("llama3.1:8b", "LLaMA 3.1 8B"),
    model("qwen2.5:14b", "Qwen 2.5 14B"),
    model("mistral:7b", "Mistral 7B"),
    model("deepseek-r1:7b", "DeepSeek R1 7B"),
];

impl Provider {
    pub const ALL: [Provider; 3] = [
        Provider::RainyModel,
        Provider::OpenRouter,
        Provider::OllamaFreeApi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::RainyModel => "rainymodel",
            Provider::OpenRouter => "openrouter",
            Provider::OllamaFreeApi => "ollamafreeapi",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }

    pub fn info(self) -> ProviderInfo {
        match self {
            Provider::RainyModel => ProviderInfo {
                name: "RainyModel",
                description: "Intelligent LLM Router (Default)",
                requires_key: false,
                models: RAINYMODEL_MODELS,
            },
            Provider::OpenRouter => ProviderInfo {
                name: "OpenRouter",
                description: "Premium multi-provider gateway",
                requires_key: true,
                models: OPENROUTER_MODELS,
            },
            Provider::OllamaFreeApi => ProviderInfo {
                name: "OllamaFreeAPI",
                description: "Free open-source models",
                requires_key: false,
                models: OLLAMAFREE_MODELS,
            },
        }
    }
}

/// Read a credential from the named environment variable. Empty counts as unset.
pub fn credential_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Provider bindings used by the chat relay.
#[derive(Clone)]
pub struct ProviderRegistry {
    upstreams: HashMap<Provider, Arc<dyn ChatUpstream>>,
    key_envs: HashMap<Provider, String>,
    base_urls: HashMap<Provider, String>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            upstreams: HashMap::new(),
            key_envs: HashMap::new(),
            base_urls: HashMap::new(),
        }
    }

    /// Bind every known provider to an OpenAI-compatible client built from config.
    pub fn from_config(config: &ProvidersConfig, timeout: Duration) -> Result<Self, LaminoError> {
        let mut registry = Self::empty();
        for provider in Provider::ALL {
            let endpoint = config.endpoint(provider);
            let client = OpenAiCompatibleClient::new(
                provider,
                endpoint.base_url.clone(),
                endpoint.api_key_env.clone(),
                timeout,
            )?;
            registry.register(
                provider,
                endpoint.base_url.clone(),
                endpoint.api_key_env.clone(),
                Arc::new(client),
            );
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        provider: Provider,
        base_url: String,
        api_key_env: String,
        upstream: Arc<dyn ChatUpstream>,
    ) {
        self.upstreams.insert(provider, upstream);
        self.key_envs.insert(provider, api_key_env);
        self.base_urls.insert(provider, base_url);
    }

    /// Upstream for a provider name. Unknown names fall back to the default provider.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ChatUpstream>> {
        Provider::parse(name)
            .and_then(|p| self.upstreams.get(&p))
            .or_else(|| self.upstreams.get(&Provider::default()))
            .cloned()
    }

    /// Whether a provider is usable: keyless providers always are.
    pub fn key_configured(&self, provider: Provider) -> bool {
        if !provider.info().requires_key {
            return true;
        }
        self.key_envs
            .get(&provider)
            .and_then(|var| credential_from_env(var))
            .is_some()
    }

    /// Catalogue as served by `GET /api/providers`.
    pub fn catalogue(&self) -> serde_json::Value {
        let mut providers = serde_json::Map::new();
        for provider in Provider::ALL {
            let info = provider.info();
            providers.insert(
                provider.as_str().to_string(),
                serde_json::json!({
                    "name": info.name,
                    "description": info.description,
                    "base_url": self.base_urls.get(&provider),
                    "requires_key": info.requires_key,
                    "models": info.models,
                    "key_configured": self.key_configured(provider),
                }),
            );
        }
        serde_json::Value::Object(providers)
    }

    /// Flattened model list as served by `GET /api/models`.
    pub fn models(&self) -> Vec<serde_json::Value> {
        Provider::ALL
            .into_iter()
            .flat_map(|provider| {
                let info = provider.info();
                let available = self.key_configured(provider);
                info.models.iter().map(move |m| {
                    let mut v = serde_json::to_value(m).unwrap_or_default();
                    if let Some(obj) = v.as_object_mut() {
                        obj.insert("provider".into(), provider.as_str().into());
                        obj.insert("provider_name".into(), info.name.into());
                        obj.insert("available".into(), available.into());
                    }
                    v
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        let mut config = ProvidersConfig::default();
        config.openrouter.api_key_env = "LAMINO_TEST_UNSET_OPENROUTER_KEY".to_string();
        ProviderRegistry::from_config(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_round_trips_names() {
        for p in Provider::ALL {
            assert_eq!(Provider::parse(p.as_str()), Some(p));
        }
        assert_eq!(Provider::parse("anthropic"), None);
        assert_eq!(Provider::default(), Provider::RainyModel);
    }

    #[test]
    fn test_unknown_provider_resolves_to_default() {
        let registry = registry();
        let upstream = registry.resolve("no-such-provider").unwrap();
        assert_eq!(upstream.provider(), Provider::RainyModel);
        assert_eq!(
            registry.resolve("openrouter").unwrap().provider(),
            Provider::OpenRouter
        );
    }

    #[test]
    fn test_keyless_providers_always_available() {
        let registry = registry();
        assert!(registry.key_configured(Provider::RainyModel));
        assert!(registry.key_configured(Provider::OllamaFreeApi));
        assert!(!registry.key_configured(Provider::OpenRouter));
    }

    #[test]
    fn test_models_are_flattened_with_provider_fields() {
        let models = registry().models();
        assert_eq!(models.len(), 13);
        let auto = &models[0];
        assert_eq!(auto["id"], "rainymodel/auto");
        assert_eq!(auto["provider"], "rainymodel");
        assert_eq!(auto["provider_name"], "RainyModel");
        assert_eq!(auto["default"], true);
        assert_eq!(auto["available"], true);

        let gpt = models.iter().find(|m| m["id"] == "openrouter/openai/gpt-4o").unwrap();
        assert_eq!(gpt["available"], false);
    }

    #[test]
    fn test_catalogue_reports_key_status() {
        let catalogue = registry().catalogue();
        assert_eq!(catalogue["openrouter"]["key_configured"], false);
        assert_eq!(catalogue["rainymodel"]["key_configured"], true);
        assert_eq!(catalogue["rainymodel"]["base_url"], "https://rm.orcest.ai/v1");
    }
}
