use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lamino_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("SSO authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Request timed out")]
    UpstreamTimeout { provider: String, model: String },

    #[error("{message}")]
    BadGateway {
        provider: String,
        model: String,
        message: String,
    },

    #[error("{body}")]
    UpstreamRejected {
        status: u16,
        body: String,
        provider: String,
        model: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::WorkspaceNotFound(_) => GatewayError::NotFound("Workspace not found".into()),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::UpstreamTimeout { provider, model }
            | GatewayError::BadGateway {
                provider, model, ..
            }
            | GatewayError::UpstreamRejected {
                provider, model, ..
            } => serde_json::json!({
                "error": self.to_string(),
                "provider": provider,
                "model": model,
            }),
            GatewayError::Internal(_) => serde_json::json!({ "error": "Internal server error" }),
            _ => serde_json::json!({ "error": self.to_string() }),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(ref msg) = self {
            tracing::error!(error = %msg, "Request failed");
        }
        (self.status(), axum::Json(self.body())).into_response()
    }
}
