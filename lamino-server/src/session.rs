//! Session handling
//!
//! Tokens arrive either in the SSO session cookie or an `Authorization: Bearer`
//! header, cookie first. The `CurrentUser` extractor resolves them through the
//! identity provider and rejects the request with 401 when that fails.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, LOCATION, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lamino_core::config::SsoConfig;
use lamino_core::identity::{decode_state, is_safe_return_path};
use lamino_core::models::User;
use lamino_core::IdentityClient;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::http::HttpState;

/// Value of a single cookie from the `Cookie` request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
}

/// Session token from the cookie, falling back to a bearer header.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = cookie_value(headers, cookie_name).filter(|t| !t.is_empty()) {
        return Some(token);
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolve the caller, or `None` when unauthenticated.
pub async fn resolve_user(identity: &IdentityClient, headers: &HeaderMap) -> Option<User> {
    let token = session_token(headers, &identity.config().cookie_name).unwrap_or_default();
    identity.resolve(&token).await
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<HttpState>> for CurrentUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HttpState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(&state.identity, &parts.headers)
            .await
            .map(CurrentUser)
            .ok_or(GatewayError::Unauthenticated)
    }
}

// ============================================================================
// Cookies
// ============================================================================

fn cookie(name: &str, value: &str, max_age: u64, http_only: bool) -> String {
    let mut c = format!("{name}={value}; Path=/; Max-Age={max_age}; Secure; SameSite=Lax");
    if http_only {
        c.push_str("; HttpOnly");
    }
    c
}

/// Session cookie holding the access token.
pub fn session_cookie(config: &SsoConfig, token: &str) -> String {
    cookie(&config.cookie_name, token, config.cookie_max_age_secs, true)
}

/// Script-readable cookie with the display identity (base64 JSON).
pub fn user_info_cookie(config: &SsoConfig, user: &User) -> String {
    let info = serde_json::json!({
        "sub": user.subject_id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
    });
    let encoded = STANDARD.encode(info.to_string());
    cookie(
        &config.user_cookie_name,
        &encoded,
        config.cookie_max_age_secs,
        false,
    )
}

pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; Secure; SameSite=Lax")
}

// ============================================================================
// Redirect flow
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Where the browser goes next, plus any cookies to set on the way.
#[derive(Debug, PartialEq)]
pub struct Redirect {
    pub location: String,
    pub cookies: Vec<String>,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            cookies: Vec::new(),
        }
    }
}

impl IntoResponse for Redirect {
    fn into_response(self) -> Response {
        let cookies: Vec<_> = self.cookies.into_iter().map(|c| (SET_COOKIE, c)).collect();
        (
            StatusCode::FOUND,
            [(LOCATION, self.location)],
            AppendHeaders(cookies),
        )
            .into_response()
    }
}

fn safe_return(config: &SsoConfig, candidate: Option<String>) -> String {
    candidate
        .filter(|p| is_safe_return_path(p))
        .unwrap_or_else(|| config.default_return_to.clone())
}

/// Start the authorization-code flow.
pub fn login_inner(identity: &IdentityClient, query: LoginQuery) -> Result<Redirect, GatewayError> {
    let return_to = safe_return(identity.config(), query.return_to);
    let url = identity
        .authorize_url(&return_to)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(Redirect::to(url.to_string()))
}

/// Finish the authorization-code flow.
///
/// A failed exchange sends the browser back to the provider instead of
/// surfacing an error page.
pub async fn callback_inner(
    identity: &IdentityClient,
    query: CallbackQuery,
) -> Result<Redirect, GatewayError> {
    let config = identity.config();
    let code = match query.code.filter(|c| !c.is_empty()) {
        Some(c) if !config.dev_mode() => c,
        _ => return Ok(Redirect::to(config.default_return_to.clone())),
    };

    let return_to = safe_return(config, query.state.as_deref().and_then(decode_state));

    match identity.exchange_code(&code).await {
        Ok(token) => {
            let mut cookies = vec![session_cookie(config, &token)];
            if let Some(user) = identity.resolve(&token).await {
                cookies.push(user_info_cookie(config, &user));
            }
            tracing::info!(return_to = %return_to, "SSO login completed");
            Ok(Redirect {
                location: return_to,
                cookies,
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authorization code exchange failed");
            login_inner(
                identity,
                LoginQuery {
                    return_to: Some(return_to),
                },
            )
        }
    }
}

/// Clear both cookies and send the browser back into the login flow.
pub fn logout_inner(identity: &IdentityClient) -> Result<Redirect, GatewayError> {
    let config = identity.config();
    let mut redirect = login_inner(identity, LoginQuery::default())?;
    redirect.cookies = vec![
        expired_cookie(&config.cookie_name),
        expired_cookie(&config.user_cookie_name),
    ];
    Ok(redirect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_cookie_wins_over_bearer() {
        let h = headers(&[
            ("cookie", "theme=dark; lamino_sso_token=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(
            session_token(&h, "lamino_sso_token").as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_bearer_fallback() {
        let h = headers(&[("authorization", "Bearer abc")]);
        assert_eq!(session_token(&h, "lamino_sso_token").as_deref(), Some("abc"));

        let h = headers(&[("cookie", "lamino_sso_token="), ("authorization", "Basic xyz")]);
        assert_eq!(session_token(&h, "lamino_sso_token"), None);
    }

    #[test]
    fn test_cookie_across_multiple_headers() {
        let h = headers(&[("cookie", "a=1"), ("cookie", "lamino_sso_token=t")]);
        assert_eq!(cookie_value(&h, "lamino_sso_token").as_deref(), Some("t"));
        assert_eq!(cookie_value(&h, "missing"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = SsoConfig::default();
        let c = session_cookie(&config, "tok");
        assert!(c.starts_with("lamino_sso_token=tok;"));
        assert!(c.contains("HttpOnly"));
        assert!(c.contains("Secure"));
        assert!(c.contains("SameSite=Lax"));
        assert!(c.contains("Max-Age=86400"));

        let info = user_info_cookie(&config, &User::developer());
        assert!(info.starts_with("lamino_user_info="));
        assert!(!info.contains("HttpOnly"));
    }

    #[test]
    fn test_logout_clears_both_cookies() {
        let identity = IdentityClient::new(SsoConfig::default()).unwrap();
        let r = logout_inner(&identity).unwrap();
        assert!(r
            .location
            .starts_with("https://login.orcest.ai/oauth2/authorize?"));
        assert_eq!(r.cookies.len(), 2);
        assert!(r.cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn test_login_rejects_foreign_return_path() {
        let identity = IdentityClient::new(SsoConfig::default()).unwrap();
        let r = login_inner(
            &identity,
            LoginQuery {
                return_to: Some("https://evil.example/".into()),
            },
        )
        .unwrap();
        let url = reqwest::Url::parse(&r.location).unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(decode_state(&state).as_deref(), Some("/lamino"));
    }

    #[tokio::test]
    async fn test_callback_without_code_goes_home() {
        let identity = IdentityClient::new(SsoConfig {
            client_secret: Some("s".into()),
            ..SsoConfig::default()
        })
        .unwrap();
        let r = callback_inner(&identity, CallbackQuery::default())
            .await
            .unwrap();
        assert_eq!(r, Redirect::to("/lamino"));
    }
}
