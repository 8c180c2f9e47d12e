use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An identity asserted by the SSO provider. Never stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub subject_id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl User {
    /// Fixed identity used when no SSO client secret is configured.
    pub fn developer() -> Self {
        Self {
            subject_id: "dev-user".to_string(),
            name: "Developer".to_string(),
            email: Some("dev@orcest.ai".to_string()),
            role: Some("admin".to_string()),
        }
    }

    /// Build a user from an OIDC userinfo document.
    ///
    /// The subject comes from `sub`, then `id`, then falls back to `anonymous`.
    pub fn from_claims(claims: &Value) -> Self {
        let subject_id = ["sub", "id"]
            .iter()
            .find_map(|key| match claims.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "anonymous".to_string());

        let text = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            subject_id,
            name: text("name").unwrap_or_else(|| "User".to_string()),
            email: text("email"),
            role: text("role"),
        }
    }
}
