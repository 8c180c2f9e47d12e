pub mod chat;
pub mod files;
pub mod workspaces;
