pub mod file;
pub mod message;
pub mod user;
pub mod workspace;

pub use file::{FileKind, FilePreview, FileSummary, UploadedFile};
pub use message::{ChatMetadata, Message, Role};
pub use user::User;
pub use workspace::{NewWorkspace, SettingsPatch, Workspace, WorkspacePatch, WorkspaceSettings};
