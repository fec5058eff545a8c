//! In-app notification store

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::render::RenderedNotification;
use super::{NotificationSink, Recipient};
use crate::entity::notification;
use crate::error::{AppError, AppResult};

/// Persists notices for the in-app inbox
#[derive(Clone)]
pub struct DatabaseSink {
    db: DatabaseConnection,
}

impl DatabaseSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for DatabaseSink {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        notice: &RenderedNotification,
    ) -> anyhow::Result<()> {
        notification::ActiveModel {
            user_id: Set(recipient.user_id),
            kind: Set(notice.kind.as_str().to_string()),
            item_type: Set(notice.item_type.as_str().to_string()),
            item_id: Set(notice.item_id),
            item_name: Set(notice.item_name.clone()),
            permission: Set(notice.permission.map(|p| p.as_str().to_string())),
            change_type: Set(notice.change_type.clone()),
            actor_name: Set(notice.actor_name.clone()),
            message: Set(notice.message.clone()),
            read_at: Set(None),
            created_at: Set(chrono::Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

/// Newest first, capped at 200
pub async fn list_for_user(
    db: &DatabaseConnection,
    user_id: i64,
    unread_only: bool,
) -> AppResult<Vec<notification::Model>> {
    let mut query = notification::Entity::find().filter(notification::Column::UserId.eq(user_id));
    if unread_only {
        query = query.filter(notification::Column::ReadAt.is_null());
    }
    Ok(query
        .order_by_desc(notification::Column::CreatedAt)
        .order_by_desc(notification::Column::Id)
        .limit(200)
        .all(db)
        .await?)
}

/// Mark one of the user's notifications read; idempotent
pub async fn mark_read(
    db: &DatabaseConnection,
    user_id: i64,
    id: i64,
) -> AppResult<notification::Model> {
    let model = notification::Entity::find_by_id(id)
        .one(db)
        .await?
        .filter(|n| n.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("notification {}", id)))?;

    if model.read_at.is_some() {
        return Ok(model);
    }

    let mut active: notification::ActiveModel = model.into();
    active.read_at = Set(Some(chrono::Utc::now().timestamp()));
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::role::RoleKind;
    use crate::notify::render::render_share;
    use crate::permission::{ItemType, Permission};
    use crate::test_util::{memory_db, seed_user};

    #[tokio::test]
    async fn store_list_and_mark_read() {
        let db = memory_db().await;
        let ana = seed_user(&db, "Ana", None, RoleKind::Staff).await;
        let ben = seed_user(&db, "Ben", None, RoleKind::Staff).await;
        let sink = DatabaseSink::new(db.clone());
        let recipient = Recipient {
            user_id: ana.id,
            name: ana.name.clone(),
            email: ana.email.clone(),
        };

        let notice = render_share("Ben", ItemType::Document, 1, "Budget.xlsx", Permission::Viewer);
        sink.deliver(&recipient, &notice).await.unwrap();

        let unread = list_for_user(&db, ana.id, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].permission.as_deref(), Some("viewer"));

        assert!(matches!(
            mark_read(&db, ben.id, unread[0].id).await,
            Err(AppError::NotFound(_))
        ));
        let read = mark_read(&db, ana.id, unread[0].id).await.unwrap();
        assert!(read.read_at.is_some());

        assert!(list_for_user(&db, ana.id, true).await.unwrap().is_empty());
        assert_eq!(list_for_user(&db, ana.id, false).await.unwrap().len(), 1);
    }
}
