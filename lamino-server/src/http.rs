//! Lamino HTTP API
//!
//! Axum server for the chat gateway: SSO login flow, workspace management,
//! file uploads and the chat relay.
//!
//! Each endpoint has a thin axum handler that resolves the caller and delegates
//! to a function in `subsystems` or `session`. Those functions take plain
//! arguments and are tested without going through the router.
//!
//! Endpoints:
//! - GET  /health, /version, /api/health, /metrics
//! - GET  /, /lamino                      chat shell (redirects into login)
//! - GET  /auth/login, /auth/callback, /auth/logout
//! - GET|POST /api/workspaces
//! - PUT|DELETE /api/workspaces/:id
//! - GET|DELETE /api/workspaces/:id/history
//! - GET  /api/providers, /api/models
//! - POST /api/upload
//! - GET  /api/files/:id, /api/files/:id/preview
//! - POST /api/chat

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use lamino_core::models::{NewWorkspace, WorkspacePatch};
use lamino_core::{
    FileStore, IdentityClient, InMemoryFileStore, InMemoryWorkspaceStore, LaminoConfig,
    ProviderRegistry, WorkspaceStore,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::pages::chat_shell;
use crate::session::{
    callback_inner, login_inner, logout_inner, resolve_user, CallbackQuery, CurrentUser,
    LoginQuery,
};
use crate::subsystems::chat::{complete_chat, prepare_chat, relay_sse, ChatRequest};
use crate::subsystems::files::{
    accept_upload, check_file_type, find_file, inline_disposition, Upload,
};
use crate::subsystems::workspaces;

/// Upload bodies may be this many times the file size cap, so moderately
/// oversize files still reach validation and get the size error.
const UPLOAD_BODY_FACTOR: usize = 2;

pub const FEATURES: &[&str] = &[
    "sso_only_auth",
    "per_user_workspaces",
    "team_enterprise_premium",
    "rainymodel_auto_connect",
    "provider_model_selection",
    "decision_chain_tracking",
    "file_upload",
    "streaming_chat",
];

/// Request counter and process uptime served at `/metrics`.
pub struct RequestMetrics {
    requests: AtomicU64,
    started: Instant,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub config: LaminoConfig,
    pub workspaces: Arc<dyn WorkspaceStore>,
    pub files: Arc<dyn FileStore>,
    pub identity: IdentityClient,
    pub providers: ProviderRegistry,
    pub metrics: Arc<RequestMetrics>,
}

impl HttpState {
    /// State with in-memory stores and upstream clients built from config.
    pub fn from_config(config: LaminoConfig) -> Result<Self> {
        let identity = IdentityClient::new(config.sso.clone())?;
        let providers = ProviderRegistry::from_config(
            &config.providers,
            Duration::from_secs(config.chat.request_timeout_secs),
        )?;

        Ok(Self {
            workspaces: Arc::new(InMemoryWorkspaceStore::new()),
            files: Arc::new(InMemoryFileStore::new()),
            identity,
            providers,
            metrics: Arc::new(RequestMetrics::new()),
            config,
        })
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let upload_limit = state.config.files.max_file_size * UPLOAD_BODY_FACTOR;

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/health", get(api_health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/", get(shell_handler))
        .route("/lamino", get(shell_handler))
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/logout", get(logout_handler))
        .route(
            "/api/workspaces",
            get(list_workspaces_handler).post(create_workspace_handler),
        )
        .route(
            "/api/workspaces/:id",
            put(update_workspace_handler).delete(delete_workspace_handler),
        )
        .route(
            "/api/workspaces/:id/history",
            get(history_handler).delete(clear_history_handler),
        )
        .route("/api/providers", get(providers_handler))
        .route("/api/models", get(models_handler))
        .route(
            "/api/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/files/:id", get(file_handler))
        .route("/api/files/:id/preview", get(file_preview_handler))
        .route("/api/chat", post(chat_handler))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            count_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    config: LaminoConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState::from_config(config)?);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Lamino HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Status bodies
// ============================================================================

pub fn health_inner() -> Value {
    json!({
        "status": "healthy",
        "service": "lamino",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "lamino/1",
    })
}

pub fn api_health_inner() -> Value {
    json!({
        "status": "healthy",
        "service": "lamino",
        "version": env!("CARGO_PKG_VERSION"),
        "features": FEATURES,
    })
}

pub fn metrics_inner(metrics: &RequestMetrics) -> Value {
    json!({
        "uptime_seconds": metrics.uptime().as_secs(),
        "total_requests": metrics.total_requests(),
        "service": "lamino",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

async fn count_requests(
    State(metrics): State<Arc<RequestMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    metrics.record();
    next.run(req).await
}

// ============================================================================
// Axum handlers (thin wrappers)
// ============================================================================

async fn health_handler() -> Json<Value> {
    Json(health_inner())
}

async fn version_handler() -> Json<Value> {
    Json(version_inner())
}

async fn api_health_handler() -> Json<Value> {
    Json(api_health_inner())
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> Json<Value> {
    Json(metrics_inner(&state.metrics))
}

async fn shell_handler(
    State(state): State<Arc<HttpState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    match resolve_user(&state.identity, &headers).await {
        Some(user) => Ok(Html(chat_shell(&user)).into_response()),
        None => {
            let query = LoginQuery {
                return_to: Some(uri.path().to_string()),
            };
            Ok(login_inner(&state.identity, query)?.into_response())
        }
    }
}

async fn login_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, GatewayError> {
    Ok(login_inner(&state.identity, query)?.into_response())
}

async fn callback_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, GatewayError> {
    Ok(callback_inner(&state.identity, query).await?.into_response())
}

async fn logout_handler(State(state): State<Arc<HttpState>>) -> Result<Response, GatewayError> {
    Ok(logout_inner(&state.identity)?.into_response())
}

async fn list_workspaces_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, GatewayError> {
    let list = workspaces::list_workspaces(state.workspaces.as_ref(), &user).await?;
    Ok(Json(json!({ "workspaces": list })))
}

async fn create_workspace_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewWorkspace>,
) -> Result<Json<Value>, GatewayError> {
    let ws = workspaces::create_workspace(state.workspaces.as_ref(), &user, req).await?;
    Ok(Json(json!({ "workspace": ws })))
}

async fn update_workspace_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<WorkspacePatch>,
) -> Result<Json<Value>, GatewayError> {
    let ws = workspaces::update_workspace(state.workspaces.as_ref(), &user, &id, patch).await?;
    Ok(Json(json!({ "workspace": ws })))
}

async fn delete_workspace_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    workspaces::delete_workspace(state.workspaces.as_ref(), &user, &id).await?;
    Ok(Json(json!({ "deleted": true })))
}

async fn history_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let history = workspaces::get_history(state.workspaces.as_ref(), &user, &id).await?;
    Ok(Json(json!({ "history": history })))
}

async fn clear_history_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    workspaces::clear_history(state.workspaces.as_ref(), &user, &id).await?;
    Ok(Json(json!({ "cleared": true })))
}

async fn providers_handler(
    State(state): State<Arc<HttpState>>,
    _user: CurrentUser,
) -> Json<Value> {
    Json(json!({ "providers": state.providers.catalogue() }))
}

async fn models_handler(State(state): State<Arc<HttpState>>, _user: CurrentUser) -> Json<Value> {
    Json(json!({ "models": state.providers.models() }))
}

async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<Value>, GatewayError> {
    let max_mb = state.config.files.max_file_size / (1024 * 1024);
    let bad_form = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::Validation(format!("File too large (max {max_mb}MB)"))
        } else {
            GatewayError::Validation(e.body_text())
        }
    };

    let mut upload: Option<Upload> = None;
    let mut workspace_id = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                // Before buffering: an oversize file of a forbidden type still
                // gets the type error.
                check_file_type(&filename)?;
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(bad_form)?;
                upload = Some(Upload {
                    filename,
                    content_type,
                    data,
                    workspace_id: None,
                });
            }
            "workspace_id" => workspace_id = Some(field.text().await.map_err(bad_form)?),
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| GatewayError::Validation("No file provided".into()))?;
    upload.workspace_id = workspace_id;

    let summary = accept_upload(state.files.as_ref(), &state.config.files, &user, upload).await?;
    Ok(Json(json!({ "file": summary })))
}

async fn file_handler(
    State(state): State<Arc<HttpState>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let file = find_file(state.files.as_ref(), &id).await?;
    let headers = [
        (CONTENT_TYPE, file.content_type.clone()),
        (CONTENT_DISPOSITION, inline_disposition(&file.name)),
    ];
    Ok((headers, file.data).into_response())
}

async fn file_preview_handler(
    State(state): State<Arc<HttpState>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let file = find_file(state.files.as_ref(), &id).await?;
    Ok(Json(json!({ "file": file.preview() })))
}

async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    let stream = req.stream;
    let chat = prepare_chat(
        state.workspaces.as_ref(),
        state.files.as_ref(),
        &state.providers,
        &state.config.chat,
        &user,
        req,
    )
    .await?;

    if stream {
        let sse = relay_sse(state.workspaces.clone(), state.config.chat.clone(), chat);
        return Ok(sse.into_response());
    }

    let reply = complete_chat(state.workspaces.as_ref(), &state.config.chat, chat).await?;
    Ok(Json(reply).into_response())
}
