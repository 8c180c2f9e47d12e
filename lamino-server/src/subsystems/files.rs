//! File uploads: validation, storage and retrieval.

use bytes::Bytes;
use chrono::Utc;
use lamino_core::config::FilesConfig;
use lamino_core::models::file::extension_of;
use lamino_core::models::{FileKind, FileSummary, UploadedFile, User};
use lamino_core::FileStore;
use uuid::Uuid;

use crate::error::GatewayError;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// One file as received from a multipart upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub workspace_id: Option<String>,
}

/// Extension and kind of an allowed file name.
pub fn check_file_type(filename: &str) -> Result<(String, FileKind), GatewayError> {
    let extension = extension_of(filename);
    match FileKind::from_extension(&extension) {
        Some(kind) => Ok((extension, kind)),
        None => Err(GatewayError::Validation(format!(
            "File type {extension} not supported"
        ))),
    }
}

/// Validate and store an upload. Type is checked before size; nothing is
/// stored when either check fails.
pub async fn accept_upload(
    store: &dyn FileStore,
    limits: &FilesConfig,
    user: &User,
    upload: Upload,
) -> Result<FileSummary, GatewayError> {
    let (extension, kind) = check_file_type(&upload.filename)?;

    if upload.data.len() > limits.max_file_size {
        return Err(GatewayError::Validation(format!(
            "File too large (max {}MB)",
            limits.max_file_size / (1024 * 1024)
        )));
    }

    let file = UploadedFile {
        id: Uuid::new_v4(),
        name: upload.filename,
        kind,
        extension,
        size: upload.data.len(),
        content_type: upload
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
        uploaded_by: user.subject_id.clone(),
        workspace_id: upload.workspace_id.filter(|w| !w.is_empty()),
        uploaded_at: Utc::now(),
        data: upload.data,
    };
    let summary = file.summary();
    store.put(file).await?;

    tracing::info!(file = %summary.id, size = summary.size, user = %user.subject_id, "File uploaded");
    Ok(summary)
}

/// Look up a file by its textual id. Malformed ids are simply not found.
pub async fn find_file(store: &dyn FileStore, id: &str) -> Result<UploadedFile, GatewayError> {
    let not_found = || GatewayError::NotFound("File not found".into());
    let id = Uuid::parse_str(id).map_err(|_| not_found())?;
    store.get(id).await?.ok_or_else(not_found)
}

/// `Content-Disposition` value for inline display.
pub fn inline_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("inline; filename=\"{safe}\"")
}
