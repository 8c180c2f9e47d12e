use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::decision_chain::DecisionStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Routing metadata attached to every completed chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub model_requested: String,
    pub model_actual: String,
    pub provider: String,
    pub route: String,
    pub upstream: String,
    pub latency_ms: u64,
    /// Latency the router itself reported, when it sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_latency_ms: Option<u64>,
    pub policy: String,
    pub fallback_reason: String,
    pub decision_chain: Vec<DecisionStep>,
    pub usage: Value,
    pub timestamp: DateTime<Utc>,
}

/// One entry of a workspace's chat history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_chain: Option<Vec<DecisionStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

impl Message {
    pub fn user(content: String, files: Vec<String>, model: &str, provider: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            files,
            timestamp: Utc::now(),
            model: Some(model.to_string()),
            provider: Some(provider.to_string()),
            actual_model: None,
            route: None,
            upstream: None,
            latency_ms: None,
            decision_chain: None,
            usage: None,
        }
    }

    pub fn assistant(content: String, meta: &ChatMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content,
            files: Vec::new(),
            timestamp: Utc::now(),
            model: Some(meta.model_requested.clone()),
            provider: Some(meta.provider.clone()),
            actual_model: Some(meta.model_actual.clone()),
            route: Some(meta.route.clone()),
            upstream: Some(meta.upstream.clone()),
            latency_ms: Some(meta.latency_ms),
            decision_chain: Some(meta.decision_chain.clone()),
            usage: Some(meta.usage.clone()),
        }
    }
}
