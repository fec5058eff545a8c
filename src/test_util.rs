//! Shared fixtures for unit tests

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::{Config, DatabaseConfig};
use crate::db::init_database;
use crate::entity::role::RoleKind;
use crate::entity::user::UserStatus;
use crate::entity::{department, document, folder, role, share, user};
use crate::middleware::CurrentUser;
use crate::notify::testing::RecordingSink;
use crate::notify::{Notifier, Recipient, RenderedNotification};
use crate::permission::{ItemRef, Permission};
use crate::state::AppState;

/// Fresh migrated in-memory sqlite database
pub async fn memory_db() -> DatabaseConnection {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        path: ":memory:".to_string(),
        ..DatabaseConfig::default()
    };
    init_database(&config).await.unwrap()
}

pub async fn seed_department(db: &DatabaseConnection, name: &str, code: &str) -> department::Model {
    department::ActiveModel {
        name: Set(name.to_string()),
        code: Set(code.to_string()),
        description: Set(None),
        created_at: Set(chrono::Utc::now().timestamp()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// Active user whose email is derived from the name ("Fin Admin" -> finadmin@example.org)
pub async fn seed_user(
    db: &DatabaseConnection,
    name: &str,
    department_id: Option<i64>,
    kind: RoleKind,
) -> CurrentUser {
    let role = role::Entity::find()
        .filter(role::Column::Name.eq(kind.as_str()))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let email = format!("{}@example.org", name.to_lowercase().replace(' ', ""));

    let model = user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email),
        password: Set(bcrypt::hash("password", 4).unwrap()),
        role_id: Set(Some(role.id)),
        department_id: Set(department_id),
        status: Set(UserStatus::Active.into()),
        last_login: Set(0),
        created_at: Set(chrono::Utc::now().timestamp()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    CurrentUser::load(db, model.id).await.unwrap().unwrap()
}

pub async fn seed_folder(
    db: &DatabaseConnection,
    owner: &CurrentUser,
    department_id: i64,
    parent_id: Option<i64>,
    name: &str,
) -> folder::Model {
    let now = chrono::Utc::now().timestamp();
    folder::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        parent_id: Set(parent_id),
        department_id: Set(department_id),
        owner_id: Set(owner.id),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// Document row without a stored file behind it
pub async fn seed_document(
    db: &DatabaseConnection,
    owner: &CurrentUser,
    department_id: i64,
    folder_id: Option<i64>,
    title: &str,
) -> document::Model {
    let now = chrono::Utc::now().timestamp();
    document::ActiveModel {
        title: Set(title.to_string()),
        description: Set(None),
        file_path: Set(format!("documents/{}.bin", uuid::Uuid::new_v4())),
        preview_path: Set(None),
        original_name: Set(title.to_string()),
        mime_type: Set(crate::storage::get_mime_type(title)),
        size: Set(0),
        department_id: Set(department_id),
        document_type_id: Set(None),
        folder_id: Set(folder_id),
        uploaded_by: Set(owner.id),
        owner_id: Set(owner.id),
        status: Set("draft".to_string()),
        rejection_reason: Set(None),
        uploaded_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_share(
    db: &DatabaseConnection,
    owner: &CurrentUser,
    target: &CurrentUser,
    item: ItemRef,
    permission: Permission,
) -> share::Model {
    let now = chrono::Utc::now().timestamp();
    let (document_id, folder_id) = match item {
        ItemRef::Document(id) => (Some(id), None),
        ItemRef::Folder(id) => (None, Some(id)),
    };
    share::ActiveModel {
        owner_id: Set(owner.id),
        target_user_id: Set(target.id),
        document_id: Set(document_id),
        folder_id: Set(folder_id),
        permission: Set(permission.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// Application state over an in-memory database and a temporary store.
/// No converter; notifications go to a recording sink.
pub struct TestApp {
    pub state: AppState,
    pub notices: UnboundedReceiver<(Recipient, RenderedNotification)>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db().await;

        let mut config = Config::default();
        config.storage.root_dir = dir.path().to_path_buf();
        config.max_upload_size = 1024 * 1024;
        config.converter.enabled = false;

        let (sink, notices) = RecordingSink::new();
        let state = AppState::new(db, config)
            .with_converter(None)
            .with_notifier(Notifier::new().with_sink(sink));

        Self {
            state,
            notices,
            _dir: dir,
        }
    }

    /// Wait for the next delivered notification
    pub async fn next_notification(&mut self) -> (Recipient, RenderedNotification) {
        tokio::time::timeout(Duration::from_secs(5), self.notices.recv())
            .await
            .expect("no notification delivered")
            .expect("notification channel closed")
    }

    /// True when nothing arrives within a short grace period
    pub async fn no_notification(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(200), self.notices.recv())
            .await
            .is_err()
    }
}
