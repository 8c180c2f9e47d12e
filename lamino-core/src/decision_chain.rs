//! Decision chain synthesis
//!
//! Produces the human-readable explanation of how a chat request travelled from
//! the caller's model request to the model that actually ran. Pure: derived
//! entirely from the routing trace, no I/O.

use serde::{Deserialize, Serialize};

use crate::providers::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Request,
    Router,
    Upstream,
    Provider,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionStep {
    pub step: u32,
    pub node: String,
    pub detail: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
}

/// Everything the chain is derived from.
#[derive(Debug, Clone, Copy)]
pub struct RoutingTrace<'a> {
    pub provider: &'a str,
    pub model_requested: &'a str,
    pub route: &'a str,
    pub upstream: &'a str,
    pub actual_model: &'a str,
    pub policy: &'a str,
    pub fallback_reason: &'a str,
}

/// Display name for an upstream id reported by the router.
pub fn upstream_display_name(upstream: &str) -> &str {
    match upstream {
        "hf" => "HuggingFace Router",
        "ollama" => "Ollama (Self-hosted)",
        "openrouter" => "OpenRouter (Premium)",
        "ollamafreeapi" => "OllamaFreeAPI (Free)",
        other => other,
    }
}

pub fn build_decision_chain(trace: &RoutingTrace<'_>) -> Vec<DecisionStep> {
    let mut nodes: Vec<(String, String, StepKind)> = vec![(
        "User Request".to_string(),
        format!("Model: {}, Policy: {}", trace.model_requested, trace.policy),
        StepKind::Request,
    )];

    let router = Provider::default().as_str();
    if trace.provider == router || trace.model_requested.contains(router) {
        nodes.push((
            "RainyModel Router".to_string(),
            format!("Policy: {}, Route: {}", trace.policy, trace.route),
            StepKind::Router,
        ));

        let mut detail = format!("Upstream: {}", trace.upstream);
        if !trace.fallback_reason.is_empty() {
            detail.push_str(&format!(", Fallback: {}", trace.fallback_reason));
        }
        nodes.push((
            upstream_display_name(trace.upstream).to_string(),
            detail,
            StepKind::Upstream,
        ));
    } else {
        let name = Provider::parse(trace.provider)
            .map(|p| p.info().name)
            .unwrap_or(trace.provider);
        nodes.push((
            name.to_string(),
            "Direct provider call".to_string(),
            StepKind::Provider,
        ));
    }

    nodes.push((
        format!("Model: {}", trace.actual_model),
        "Final model execution".to_string(),
        StepKind::Model,
    ));

    nodes
        .into_iter()
        .zip(1u32..)
        .map(|((node, detail, kind), step)| DecisionStep {
            step,
            node,
            detail,
            kind,
        })
        .collect()
}
