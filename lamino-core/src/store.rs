//! Storage abstraction for workspaces, chat history and uploaded files
//!
//! Handlers only ever see the `WorkspaceStore` / `FileStore` traits. The
//! in-memory backends below stand in for a database and lose everything on
//! restart.
//!
//! Each in-memory store guards its maps with a single `RwLock`, so history
//! appends and clears are atomic and never lose entries under concurrency.
//! Concurrent chats on one workspace may still interleave their turns.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Message, UploadedFile, Workspace};

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Workspace>, StoreError>;

    /// Insert or replace a workspace. A new id starts with an empty history.
    async fn put(&self, workspace: Workspace) -> Result<(), StoreError>;

    /// Replace an existing workspace, keeping its history. Fails with
    /// `WorkspaceNotFound` if the id was deleted in the meantime.
    async fn update(&self, workspace: Workspace) -> Result<(), StoreError>;

    /// Insert unless the id already exists; returns whichever is stored.
    async fn insert_if_absent(&self, workspace: Workspace) -> Result<Workspace, StoreError>;

    /// Remove a workspace and its entire history. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Workspaces the user owns or is a member of, oldest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Workspace>, StoreError>;

    /// Append to a workspace's history. Fails if the workspace does not exist.
    async fn append_message(&self, workspace_id: &str, message: Message) -> Result<(), StoreError>;

    async fn history(&self, workspace_id: &str) -> Result<Vec<Message>, StoreError>;

    /// The last `limit` history entries in original order.
    async fn recent_history(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let all = self.history(workspace_id).await?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn clear_history(&self, workspace_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, file: UploadedFile) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<UploadedFile>, StoreError>;
}

// ============================================================================
// In-memory workspace store
// ============================================================================

#[derive(Default)]
struct WorkspaceTables {
    workspaces: HashMap<String, Workspace>,
    histories: HashMap<String, Vec<Message>>,
}

#[derive(Default)]
pub struct InMemoryWorkspaceStore {
    tables: RwLock<WorkspaceTables>,
}

impl InMemoryWorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn get(&self, id: &str) -> Result<Option<Workspace>, StoreError> {
        Ok(self.tables.read().await.workspaces.get(id).cloned())
    }

    async fn put(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.histories.entry(workspace.id.clone()).or_default();
        tables.workspaces.insert(workspace.id.clone(), workspace);
        Ok(())
    }

    async fn update(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.workspaces.get_mut(&workspace.id) {
            Some(stored) => {
                *stored = workspace;
                Ok(())
            }
            None => Err(StoreError::WorkspaceNotFound(workspace.id)),
        }
    }

    async fn insert_if_absent(&self, workspace: Workspace) -> Result<Workspace, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.workspaces.get(&workspace.id) {
            return Ok(existing.clone());
        }
        tables.histories.entry(workspace.id.clone()).or_default();
        tables
            .workspaces
            .insert(workspace.id.clone(), workspace.clone());
        Ok(workspace)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        tables.histories.remove(id);
        Ok(tables.workspaces.remove(id).is_some())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Workspace>, StoreError> {
        let tables = self.tables.read().await;
        let mut found: Vec<Workspace> = tables
            .workspaces
            .values()
            .filter(|ws| ws.can_access(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn append_message(&self, workspace_id: &str, message: Message) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.histories.get_mut(workspace_id) {
            Some(history) => {
                history.push(message);
                Ok(())
            }
            None => Err(StoreError::WorkspaceNotFound(workspace_id.to_string())),
        }
    }

    async fn history(&self, workspace_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .histories
            .get(workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_history(&self, workspace_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.workspaces.contains_key(workspace_id) {
            tables.histories.insert(workspace_id.to_string(), Vec::new());
        }
        Ok(())
    }
}

// ============================================================================
// In-memory file store
// ============================================================================

#[derive(Default)]
pub struct InMemoryFileStore {
    files: RwLock<HashMap<Uuid, UploadedFile>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn put(&self, file: UploadedFile) -> Result<(), StoreError> {
        self.files.write().await.insert(file.id, file);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadedFile>, StoreError> {
        Ok(self.files.read().await.get(&id).cloned())
    }
}
