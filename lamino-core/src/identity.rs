//! SSO identity provider client
//!
//! Resolves bearer tokens through the provider's OIDC userinfo endpoint and
//! runs the server-side half of the authorization-code exchange.

use std::time::Duration;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SsoConfig;
use crate::models::User;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned {0}")]
    TokenRejected(u16),

    #[error("Token response carried no access_token")]
    MissingAccessToken,

    #[error("SSO client secret is not configured")]
    NotConfigured,

    #[error("Invalid issuer URL: {0}")]
    InvalidIssuer(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct LoginState {
    #[serde(rename = "returnTo")]
    return_to: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Encode a return path as the opaque OAuth `state` value (unpadded base64url JSON).
pub fn encode_state(return_to: &str) -> String {
    let json = serde_json::to_vec(&LoginState {
        return_to: return_to.to_string(),
    })
    .unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a `state` value back to its return path. Tolerates missing padding.
pub fn decode_state(state: &str) -> Option<String> {
    let trimmed = state.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(state))
        .ok()?;
    serde_json::from_slice::<LoginState>(&bytes)
        .ok()
        .map(|s| s.return_to)
}

/// Only local absolute paths are accepted as post-login destinations.
pub fn is_safe_return_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: Client,
    config: SsoConfig,
}

impl IdentityClient {
    pub fn new(config: SsoConfig) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.verify_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    /// Resolve a token to a user, or `None` when unauthenticated.
    ///
    /// Without a client secret every call resolves to [`User::developer`].
    pub async fn resolve(&self, token: &str) -> Option<User> {
        if self.config.dev_mode() {
            return Some(User::developer());
        }
        if token.is_empty() {
            return None;
        }

        let url = format!("{}/oauth2/userinfo", self.config.issuer.trim_end_matches('/'));
        let response = match self.client.get(&url).bearer_auth(token).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Userinfo request failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::debug!(status = response.status().as_u16(), "Userinfo rejected token");
            return None;
        }

        match response.json::<serde_json::Value>().await {
            Ok(claims) => Some(User::from_claims(&claims)),
            Err(e) => {
                tracing::warn!(error = %e, "Userinfo response was not JSON");
                None
            }
        }
    }

    /// Provider authorize URL that returns the browser to `return_to` after login.
    pub fn authorize_url(&self, return_to: &str) -> Result<Url, IdentityError> {
        let base = format!("{}/oauth2/authorize", self.config.issuer.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid profile email"),
                ("state", encode_state(return_to).as_str()),
            ],
        )
        .map_err(|e| IdentityError::InvalidIssuer(e.to_string()))
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, IdentityError> {
        let secret = self.config.secret().ok_or(IdentityError::NotConfigured)?;
        let url = format!("{}/oauth2/token", self.config.issuer.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", secret),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(IdentityError::TokenRejected(response.status().as_u16()));
        }

        let token: TokenResponse = response.json().await?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(IdentityError::MissingAccessToken)
    }
}
