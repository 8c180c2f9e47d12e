use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::user::User;

pub const DEFAULT_MODEL: &str = "rainymodel/auto";
pub const DEFAULT_PROVIDER: &str = "rainymodel";
pub const DEFAULT_POLICY: &str = "auto";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub policy: String,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            policy: DEFAULT_POLICY.to_string(),
        }
    }
}

/// Partial settings update. Absent keys leave the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub policy: Option<String>,
}

impl WorkspaceSettings {
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(t) = patch.temperature {
            self.temperature = t;
        }
        if let Some(m) = patch.max_tokens {
            self.max_tokens = m;
        }
        if let Some(p) = patch.policy {
            self.policy = p;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub owner_name: String,
    /// Additional user ids with access. The owner is never listed here.
    pub members: Vec<String>,
    pub model: String,
    pub provider: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settings: WorkspaceSettings,
}

/// Body of a workspace creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorkspace {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub policy: Option<String>,
}

/// Body of a workspace update request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspacePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub system_prompt: Option<String>,
    pub members: Option<Vec<String>>,
    pub settings: Option<SettingsPatch>,
}

/// Deterministic id of a user's lazily created default workspace.
pub fn default_workspace_id(user_id: &str) -> String {
    let digest = Sha256::digest(format!("default-{user_id}").as_bytes());
    hex::encode(&digest[..16])
}

impl Workspace {
    pub fn create(id: String, input: NewWorkspace, owner: &User, now: DateTime<Utc>) -> Self {
        let mut settings = WorkspaceSettings::default();
        settings.merge(SettingsPatch {
            temperature: input.temperature,
            max_tokens: input.max_tokens,
            policy: input.policy,
        });

        Self {
            id,
            name: input.name.unwrap_or_else(|| "New Workspace".to_string()),
            description: input.description.unwrap_or_default(),
            owner_id: owner.subject_id.clone(),
            owner_name: owner.name.clone(),
            members: input
                .members
                .into_iter()
                .filter(|m| m != &owner.subject_id)
                .collect(),
            model: input.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            provider: input.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            system_prompt: input.system_prompt.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            settings,
        }
    }

    pub fn default_for(owner: &User, now: DateTime<Utc>) -> Self {
        let mut ws = Self::create(
            default_workspace_id(&owner.subject_id),
            NewWorkspace::default(),
            owner,
            now,
        );
        ws.name = format!("{} - Default", owner.name);
        ws.description = "Default workspace with RainyModel auto-connect".to_string();
        ws
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn can_access(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.members.iter().any(|m| m == user_id)
    }

    /// Apply a partial update and stamp `updated_at`.
    pub fn apply(&mut self, patch: WorkspacePatch, now: DateTime<Utc>) {
        if let Some(v) = patch.name {
            self.name = v;
        }
        if let Some(v) = patch.description {
            self.description = v;
        }
        if let Some(v) = patch.model {
            self.model = v;
        }
        if let Some(v) = patch.provider {
            self.provider = v;
        }
        if let Some(v) = patch.system_prompt {
            self.system_prompt = v;
        }
        if let Some(v) = patch.members {
            self.members = v.into_iter().filter(|m| m != &self.owner_id).collect();
        }
        if let Some(s) = patch.settings {
            self.settings.merge(s);
        }
        self.updated_at = now;
    }
}
