use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaminoError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Other error: {0}")]
    Other(String),
}

/// Failures surfaced by a storage backend.
///
/// `WorkspaceNotFound` is raised when a write targets a workspace that no
/// longer exists; `Backend` is reserved for durable backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}
