//! Workspace management: listing with a lazily created default, CRUD and
//! conversation history.

use chrono::Utc;
use lamino_core::models::{Message, NewWorkspace, User, Workspace, WorkspacePatch};
use lamino_core::WorkspaceStore;
use uuid::Uuid;

use crate::error::GatewayError;

/// Load a workspace the user may read or chat in.
pub async fn load_accessible(
    store: &dyn WorkspaceStore,
    user: &User,
    id: &str,
) -> Result<Workspace, GatewayError> {
    let ws = store
        .get(id)
        .await?
        .ok_or_else(|| GatewayError::NotFound("Workspace not found".into()))?;
    if !ws.can_access(&user.subject_id) {
        return Err(GatewayError::Forbidden("Access denied".into()));
    }
    Ok(ws)
}

/// All workspaces visible to the user. A user with none gets a default
/// workspace; concurrent first calls still create only one.
pub async fn list_workspaces(
    store: &dyn WorkspaceStore,
    user: &User,
) -> Result<Vec<Workspace>, GatewayError> {
    let found = store.list_for_user(&user.subject_id).await?;
    if !found.is_empty() {
        return Ok(found);
    }
    let created = store
        .insert_if_absent(Workspace::default_for(user, Utc::now()))
        .await?;
    tracing::info!(workspace = %created.id, user = %user.subject_id, "Created default workspace");
    Ok(store.list_for_user(&user.subject_id).await?)
}

pub async fn create_workspace(
    store: &dyn WorkspaceStore,
    user: &User,
    req: NewWorkspace,
) -> Result<Workspace, GatewayError> {
    let ws = Workspace::create(Uuid::new_v4().to_string(), req, user, Utc::now());
    store.put(ws.clone()).await?;
    tracing::info!(workspace = %ws.id, user = %user.subject_id, "Workspace created");
    Ok(ws)
}

/// Partial update by the owner or a member; settings are merged key by key.
pub async fn update_workspace(
    store: &dyn WorkspaceStore,
    user: &User,
    id: &str,
    patch: WorkspacePatch,
) -> Result<Workspace, GatewayError> {
    let mut ws = load_accessible(store, user, id).await?;
    ws.apply(patch, Utc::now());
    store.update(ws.clone()).await?;
    Ok(ws)
}

pub async fn delete_workspace(
    store: &dyn WorkspaceStore,
    user: &User,
    id: &str,
) -> Result<(), GatewayError> {
    let ws = load_accessible(store, user, id).await?;
    if !ws.is_owner(&user.subject_id) {
        return Err(GatewayError::Forbidden("Only owner can delete workspace".into()));
    }
    store.delete(id).await?;
    tracing::info!(workspace = %id, "Workspace deleted");
    Ok(())
}

pub async fn get_history(
    store: &dyn WorkspaceStore,
    user: &User,
    id: &str,
) -> Result<Vec<Message>, GatewayError> {
    load_accessible(store, user, id).await?;
    Ok(store.history(id).await?)
}

/// Any member may clear the history, not just the owner.
pub async fn clear_history(
    store: &dyn WorkspaceStore,
    user: &User,
    id: &str,
) -> Result<(), GatewayError> {
    load_accessible(store, user, id).await?;
    store.clear_history(id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamino_core::models::workspace::default_workspace_id;
    use lamino_core::models::SettingsPatch;
    use lamino_core::InMemoryWorkspaceStore;

    fn user(id: &str) -> User {
        User {
            subject_id: id.into(),
            name: format!("User {id}"),
            email: None,
            role: None,
        }
    }

    #[tokio::test]
    async fn test_default_workspace_created_once() {
        let store = InMemoryWorkspaceStore::new();
        let alice = user("alice");

        let first = list_workspaces(&store, &alice).await.unwrap();
        let second = list_workspaces(&store, &alice).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, default_workspace_id("alice"));
        assert_eq!(first[0].name, "User alice - Default");
        assert_eq!(first[0].model, "rainymodel/auto");
    }

    #[tokio::test]
    async fn test_no_default_when_user_already_has_workspaces() {
        let store = InMemoryWorkspaceStore::new();
        let alice = user("alice");
        let bob = user("bob");
        create_workspace(
            &store,
            &alice,
            NewWorkspace {
                name: Some("Shared".into()),
                members: vec!["bob".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let mine = list_workspaces(&store, &alice).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "Shared");

        let theirs = list_workspaces(&store, &bob).await.unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].name, "Shared");
        assert!(store.get(&default_workspace_id("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_after_delete_is_not_found() {
        let store = InMemoryWorkspaceStore::new();
        let alice = user("alice");
        let ws = create_workspace(&store, &alice, NewWorkspace::default())
            .await
            .unwrap();
        let mut stale = ws.clone();
        store.delete(&ws.id).await.unwrap();

        stale.name = "late rename".into();
        assert!(matches!(
            store.update(stale).await.map_err(GatewayError::from),
            Err(GatewayError::NotFound(_))
        ));
        assert!(store.get(&ws.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_settings() {
        let store = InMemoryWorkspaceStore::new();
        let alice = user("alice");
        let ws = create_workspace(
            &store,
            &alice,
            NewWorkspace {
                name: Some("Research".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = update_workspace(
            &store,
            &alice,
            &ws.id,
            WorkspacePatch {
                settings: Some(SettingsPatch {
                    temperature: Some(0.2),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Research");
        assert_eq!(updated.settings.temperature, 0.2);
        assert_eq!(updated.settings.max_tokens, 4096);
        assert_eq!(updated.settings.policy, "auto");
        assert!(updated.updated_at >= ws.updated_at);
    }

    #[tokio::test]
    async fn test_members_update_but_cannot_delete() {
        let store = InMemoryWorkspaceStore::new();
        let alice = user("alice");
        let bob = user("bob");
        let ws = create_workspace(
            &store,
            &alice,
            NewWorkspace {
                members: vec!["bob".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let renamed = update_workspace(
            &store,
            &bob,
            &ws.id,
            WorkspacePatch {
                name: Some("Shared".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Shared");
        assert_eq!(renamed.owner_id, "alice");

        assert!(matches!(
            update_workspace(&store, &user("mallory"), &ws.id, WorkspacePatch::default()).await,
            Err(GatewayError::Forbidden(_))
        ));
        assert!(matches!(
            delete_workspace(&store, &bob, &ws.id).await,
            Err(GatewayError::Forbidden(_))
        ));

        // Members may still read and clear history.
        assert!(get_history(&store, &bob, &ws.id).await.unwrap().is_empty());
        clear_history(&store, &bob, &ws.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_not_found_vs_forbidden() {
        let store = InMemoryWorkspaceStore::new();
        let ws = create_workspace(&store, &user("alice"), NewWorkspace::default())
            .await
            .unwrap();

        assert!(matches!(
            get_history(&store, &user("mallory"), &ws.id).await,
            Err(GatewayError::Forbidden(_))
        ));
        assert!(matches!(
            get_history(&store, &user("alice"), "nope").await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_history() {
        let store = InMemoryWorkspaceStore::new();
        let alice = user("alice");
        let ws = create_workspace(&store, &alice, NewWorkspace::default())
            .await
            .unwrap();
        store
            .append_message(
                &ws.id,
                Message::user("hi".into(), Vec::new(), "rainymodel/auto", "rainymodel"),
            )
            .await
            .unwrap();

        delete_workspace(&store, &alice, &ws.id).await.unwrap();
        assert!(matches!(
            get_history(&store, &alice, &ws.id).await,
            Err(GatewayError::NotFound(_))
        ));
    }
}
