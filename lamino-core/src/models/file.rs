use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".txt", ".md", ".csv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
}

impl FileKind {
    /// Classify a lower-cased, dot-prefixed extension. `None` means not allowed.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Some(Self::Document)
        } else {
            None
        }
    }
}

/// Lower-cased final extension of a filename including the dot, or `""`.
///
/// Dotfiles such as `.png` have no extension.
pub fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub extension: String,
    pub size: usize,
    pub content_type: String,
    pub uploaded_by: String,
    pub workspace_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip)]
    pub data: Bytes,
}

/// Metadata returned to the uploader. Never carries file contents.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub extension: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePreview {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub extension: String,
    pub size: usize,
    pub is_image: bool,
    /// Inline `data:` URL, only ever populated for images.
    pub data_url: Option<String>,
}

impl UploadedFile {
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            extension: self.extension.clone(),
            size: self.size,
        }
    }

    pub fn preview(&self) -> FilePreview {
        let is_image = self.kind == FileKind::Image;
        FilePreview {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            extension: self.extension.clone(),
            size: self.size,
            is_image,
            data_url: is_image
                .then(|| format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.data))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, kind: FileKind, content_type: &str) -> UploadedFile {
        UploadedFile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            extension: extension_of(name),
            size: 3,
            content_type: content_type.to_string(),
            uploaded_by: "u1".to_string(),
            workspace_id: None,
            uploaded_at: Utc::now(),
            data: Bytes::from_static(b"abc"),
        }
    }

    #[test]
    fn test_extension_of_lowercases_final_suffix() {
        assert_eq!(extension_of("Report.PDF"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".png"), "");
    }

    #[test]
    fn test_classification() {
        assert_eq!(FileKind::from_extension(".jpeg"), Some(FileKind::Image));
        assert_eq!(FileKind::from_extension(".csv"), Some(FileKind::Document));
        assert_eq!(FileKind::from_extension(".exe"), None);
        assert_eq!(FileKind::from_extension(""), None);
    }

    #[test]
    fn test_preview_inlines_images_only() {
        let image = sample("cat.png", FileKind::Image, "image/png").preview();
        assert!(image.is_image);
        assert_eq!(image.data_url.as_deref(), Some("data:image/png;base64,YWJj"));

        let doc = sample("notes.txt", FileKind::Document, "text/plain").preview();
        assert!(!doc.is_image);
        assert!(doc.data_url.is_none());
    }

    #[test]
    fn test_summary_serializes_without_payload() {
        let json = serde_json::to_value(sample("cat.png", FileKind::Image, "image/png").summary())
            .unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["extension"], ".png");
        assert!(json.get("data").is_none());
        assert!(json.get("content_type").is_none());
    }
}
