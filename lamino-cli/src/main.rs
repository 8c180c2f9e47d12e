//! lamino-cli — terminal client for the Lamino chat session gateway
//!
//! Talks to a running gateway over its JSON API. Authenticate with an SSO
//! access token (`--token` or `LAMINO_TOKEN`); a gateway running without an
//! SSO secret accepts any caller.
//!
//! # Subcommands
//! - `status` : gateway health and features
//! - `models [--json]` : models per provider
//! - `workspaces [--json]` : workspaces visible to you
//! - `history <workspace> [--json]` : conversation of a workspace
//! - `chat <message> [-w <ws>] [--model ..] [--provider ..] [--policy ..] [--json]`

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8790";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "lamino-cli",
    version,
    about = "Lamino chat gateway client"
)]
struct Cli {
    /// Gateway URL (overrides LAMINO_HTTP_URL env var)
    #[arg(long, env = "LAMINO_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// SSO access token sent as a bearer token
    #[arg(long, env = "LAMINO_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show gateway status
    Status,

    /// List available models
    Models {
        #[arg(long)]
        json: bool,
    },

    /// List your workspaces
    Workspaces {
        #[arg(long)]
        json: bool,
    },

    /// Show a workspace's conversation
    History {
        workspace: String,

        #[arg(long)]
        json: bool,
    },

    /// Send a chat message
    Chat {
        message: String,

        /// Workspace to chat in; history is recorded there
        #[arg(short, long)]
        workspace: Option<String>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        provider: Option<String>,

        /// RainyModel routing policy (auto, uncensored, premium, free)
        #[arg(long)]
        policy: Option<String>,

        /// Print the raw JSON reply including routing metadata
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DecisionStep {
    pub step: u32,
    pub node: String,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatMetadata {
    pub model_requested: String,
    pub model_actual: String,
    pub provider: String,
    pub latency_ms: u64,
    #[serde(default)]
    pub fallback_reason: String,
    #[serde(default)]
    pub decision_chain: Vec<DecisionStep>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub metadata: ChatMetadata,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceSummary {
    pub id: String,
    pub name: String,
    pub model: String,
    pub owner_name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub provider_name: String,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub actual_model: Option<String>,
}

// ============================================================================
// Formatting
// ============================================================================

/// One-line rendering of a decision chain: `A → B → C`.
pub fn format_decision_chain(chain: &[DecisionStep]) -> String {
    let mut steps: Vec<&DecisionStep> = chain.iter().collect();
    steps.sort_by_key(|s| s.step);
    steps
        .iter()
        .map(|s| s.node.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

pub fn format_routing_summary(meta: &ChatMetadata) -> String {
    let mut line = format!(
        "{} via {} ({} ms)",
        meta.model_actual, meta.provider, meta.latency_ms
    );
    if meta.model_actual != meta.model_requested {
        line.push_str(&format!(", requested {}", meta.model_requested));
    }
    if !meta.fallback_reason.is_empty() {
        line.push_str(&format!(", fallback: {}", meta.fallback_reason));
    }
    line
}

pub fn format_workspace(ws: &WorkspaceSummary) -> String {
    let shared = if ws.members.is_empty() {
        String::new()
    } else {
        format!(" +{} members", ws.members.len())
    };
    format!(
        "{}  {}  [{}] owner: {}{}",
        ws.id, ws.name, ws.model, ws.owner_name, shared
    )
}

pub fn format_model(m: &ModelEntry) -> String {
    let mark = if m.available { " " } else { "✗" };
    format!("{} {:<40} {} ({})", mark, m.id, m.name, m.provider_name)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Gateway {
    client: reqwest::blocking::Client,
    server: String,
    token: Option<String>,
}

impl Gateway {
    fn new(server: &str, token: Option<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> anyhow::Result<Value> {
        let req = match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        };
        let resp = req.send()?;
        let status = resp.status();
        let body: Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let reason = body["error"].as_str().unwrap_or("no detail");
            anyhow::bail!("server returned {}: {}", status, reason);
        }
        Ok(body)
    }

    fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.client.get(format!("{}{}", self.server, path)))
    }

    fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        self.send(self.client.post(format!("{}{}", self.server, path)).json(body))
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn do_status(gw: &Gateway) -> anyhow::Result<()> {
    let body = gw.get("/api/health")?;
    println!("Lamino:   {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:  {}", body["version"].as_str().unwrap_or("?"));
    let features: Vec<&str> = body["features"]
        .as_array()
        .map(|f| f.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    println!("Features: {}", features.join(", "));
    Ok(())
}

fn do_models(gw: &Gateway, json: bool) -> anyhow::Result<()> {
    let body = gw.get("/api/models")?;
    if json {
        return print_json(&body["models"]);
    }
    let models: Vec<ModelEntry> = serde_json::from_value(body["models"].clone())?;
    for m in &models {
        println!("{}", format_model(m));
    }
    Ok(())
}

fn do_workspaces(gw: &Gateway, json: bool) -> anyhow::Result<()> {
    let body = gw.get("/api/workspaces")?;
    if json {
        return print_json(&body["workspaces"]);
    }
    let list: Vec<WorkspaceSummary> = serde_json::from_value(body["workspaces"].clone())?;
    for ws in &list {
        println!("{}", format_workspace(ws));
    }
    Ok(())
}

fn do_history(gw: &Gateway, workspace: &str, json: bool) -> anyhow::Result<()> {
    let body = gw.get(&format!("/api/workspaces/{}/history", workspace))?;
    if json {
        return print_json(&body["history"]);
    }
    let entries: Vec<HistoryEntry> = serde_json::from_value(body["history"].clone())?;
    if entries.is_empty() {
        eprintln!("No messages yet");
    }
    for e in &entries {
        match &e.actual_model {
            Some(m) => println!("[{} · {}]\n{}\n", e.role, m, e.content),
            None => println!("[{}]\n{}\n", e.role, e.content),
        }
    }
    Ok(())
}

fn do_chat(
    gw: &Gateway,
    message: &str,
    workspace: Option<String>,
    model: Option<String>,
    provider: Option<String>,
    policy: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let body = serde_json::json!({
        "workspace_id": workspace,
        "message": message,
        "model": model,
        "provider": provider,
        "policy": policy,
        "stream": false,
    });
    let reply = gw.post("/api/chat", &body)?;
    if json {
        return print_json(&reply);
    }

    let reply: ChatReply = serde_json::from_value(reply)?;
    println!("{}\n", reply.response);
    eprintln!("{}", format_routing_summary(&reply.metadata));
    eprintln!("{}", format_decision_chain(&reply.metadata.decision_chain));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let timeout = match cli.command {
        Commands::Chat { .. } => 130,
        _ => 10,
    };
    let gw = match Gateway::new(&cli.server, cli.token, timeout) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("lamino-cli: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Status => do_status(&gw),
        Commands::Models { json } => do_models(&gw, json),
        Commands::Workspaces { json } => do_workspaces(&gw, json),
        Commands::History { workspace, json } => do_history(&gw, &workspace, json),
        Commands::Chat {
            message,
            workspace,
            model,
            provider,
            policy,
            json,
        } => do_chat(&gw, &message, workspace, model, provider, policy, json),
    };

    if let Err(e) = result {
        eprintln!("lamino-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
