//! Activity log
//!
//! Append-only audit trail. Every entry names its subject by kind and id;
//! reads resolve a display label for the subject through `subject_label`.
//! Recording never fails the caller: insert errors are logged and dropped.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::entity::{activity, department, document, document_version, folder, share, user};
use crate::error::{AppError, AppResult};

/// Action labels
pub mod action {
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";
    pub const RENAMED: &str = "renamed";
    pub const MOVED: &str = "moved";
    pub const DELETED: &str = "deleted";
    pub const RESTORED: &str = "restored";
    pub const UPLOADED: &str = "uploaded";
    pub const VERSION_ADDED: &str = "version_added";
    pub const SHARED: &str = "shared";
    pub const UNSHARED: &str = "unshared";
    pub const SUBMITTED: &str = "submitted for QA review";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
    pub const LOGIN: &str = "login";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Department,
    Folder,
    Document,
    DocumentVersion,
    Share,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Department => "department",
            SubjectKind::Folder => "folder",
            SubjectKind::Document => "document",
            SubjectKind::DocumentVersion => "document_version",
            SubjectKind::Share => "share",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SubjectKind::User),
            "department" => Ok(SubjectKind::Department),
            "folder" => Ok(SubjectKind::Folder),
            "document" => Ok(SubjectKind::Document),
            "document_version" => Ok(SubjectKind::DocumentVersion),
            "share" => Ok(SubjectKind::Share),
            other => Err(AppError::BadRequest(format!("unknown subject type: {}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: i64,
}

impl Subject {
    pub fn new(kind: SubjectKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn user(id: i64) -> Self {
        Self::new(SubjectKind::User, id)
    }

    pub fn department(id: i64) -> Self {
        Self::new(SubjectKind::Department, id)
    }

    pub fn folder(id: i64) -> Self {
        Self::new(SubjectKind::Folder, id)
    }

    pub fn document(id: i64) -> Self {
        Self::new(SubjectKind::Document, id)
    }

    pub fn document_version(id: i64) -> Self {
        Self::new(SubjectKind::DocumentVersion, id)
    }

    pub fn share(id: i64) -> Self {
        Self::new(SubjectKind::Share, id)
    }
}

/// Display label for a subject; None when the row no longer exists
pub async fn subject_label<C: ConnectionTrait>(db: &C, subject: Subject) -> AppResult<Option<String>> {
    let label = match subject.kind {
        SubjectKind::User => user::Entity::find_by_id(subject.id)
            .one(db)
            .await?
            .map(|u| u.name),
        SubjectKind::Department => department::Entity::find_by_id(subject.id)
            .one(db)
            .await?
            .map(|d| d.name),
        SubjectKind::Folder => folder::Entity::find_by_id(subject.id)
            .one(db)
            .await?
            .map(|f| f.name),
        SubjectKind::Document => document::Entity::find_by_id(subject.id)
            .one(db)
            .await?
            .map(|d| d.title),
        SubjectKind::DocumentVersion => document_version::Entity::find_by_id(subject.id)
            .one(db)
            .await?
            .map(|v| format!("{} (v{})", v.original_name, v.version_number)),
        SubjectKind::Share => share::Entity::find_by_id(subject.id)
            .one(db)
            .await?
            .map(|s| match (s.document_id, s.folder_id) {
                (Some(id), _) => format!("document {} as {}", id, s.permission),
                (_, Some(id)) => format!("folder {} as {}", id, s.permission),
                _ => format!("share {}", s.id),
            }),
    };
    Ok(label)
}

/// Page request, normalized to page >= 1 and 1..=100 items
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PageQuery {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }.normalized()
    }

    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, 100),
        }
    }

    fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Activity entry as returned to clients
#[derive(Clone, Debug, Serialize)]
pub struct ActivityView {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub actor_name: Option<String>,
    pub subject_type: String,
    pub subject_id: i64,
    pub subject_label: Option<String>,
    pub action: String,
    pub details: Option<String>,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct ActivityLog {
    db: DatabaseConnection,
}

impl ActivityLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append an entry. Must not be called while a transaction on a
    /// single-connection pool is still open.
    pub async fn record(
        &self,
        actor_id: Option<i64>,
        subject: Subject,
        action: &str,
        details: Option<String>,
    ) {
        let entry = activity::ActiveModel {
            actor_id: Set(actor_id),
            subject_type: Set(subject.kind.as_str().to_string()),
            subject_id: Set(subject.id),
            action: Set(action.to_string()),
            details: Set(details),
            created_at: Set(chrono::Utc::now().timestamp()),
            ..Default::default()
        };

        if let Err(e) = entry.insert(&self.db).await {
            tracing::error!(
                "Failed to record activity {} on {} {}: {}",
                action,
                subject.kind,
                subject.id,
                e
            );
        }
    }

    pub async fn for_subject(&self, subject: Subject, page: PageQuery) -> AppResult<Page<ActivityView>> {
        let query = activity::Entity::find()
            .filter(activity::Column::SubjectType.eq(subject.kind.as_str()))
            .filter(activity::Column::SubjectId.eq(subject.id));
        self.paginate(query, page).await
    }

    pub async fn by_actor(&self, actor_id: i64, page: PageQuery) -> AppResult<Page<ActivityView>> {
        let query = activity::Entity::find().filter(activity::Column::ActorId.eq(actor_id));
        self.paginate(query, page).await
    }

    pub async fn all(&self, page: PageQuery) -> AppResult<Page<ActivityView>> {
        self.paginate(activity::Entity::find(), page).await
    }

    async fn paginate(
        &self,
        query: sea_orm::Select<activity::Entity>,
        page: PageQuery,
    ) -> AppResult<Page<ActivityView>> {
        let page = page.normalized();
        let total = query.clone().count(&self.db).await?;

        let rows = query
            .order_by_desc(activity::Column::CreatedAt)
            .order_by_desc(activity::Column::Id)
            .offset(page.offset())
            .limit(page.page_size)
            .all(&self.db)
            .await?;

        let items = self.render(rows).await?;
        Ok(Page {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn render(&self, rows: Vec<activity::Model>) -> AppResult<Vec<ActivityView>> {
        let actor_ids: Vec<i64> = rows.iter().filter_map(|r| r.actor_id).collect();
        let actors: HashMap<i64, String> = if actor_ids.is_empty() {
            HashMap::new()
        } else {
            user::Entity::find()
                .filter(user::Column::Id.is_in(actor_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect()
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let subject_label = match row.subject_type.parse::<SubjectKind>() {
                Ok(kind) => subject_label(&self.db, Subject::new(kind, row.subject_id)).await?,
                Err(_) => None,
            };
            items.push(ActivityView {
                id: row.id,
                actor_name: row.actor_id.and_then(|id| actors.get(&id).cloned()),
                actor_id: row.actor_id,
                subject_type: row.subject_type,
                subject_id: row.subject_id,
                subject_label,
                action: row.action,
                details: row.details,
                created_at: row.created_at,
            });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::role::RoleKind;
    use crate::test_util::{memory_db, seed_department, seed_document, seed_user};

    #[test]
    fn page_query_is_clamped() {
        let page = PageQuery::new(0, 500);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        assert_eq!(PageQuery::new(3, 0).page_size, 1);
        assert_eq!(PageQuery::new(3, 10).offset(), 20);
    }

    #[test]
    fn subject_kind_round_trip() {
        for kind in [
            SubjectKind::User,
            SubjectKind::Department,
            SubjectKind::Folder,
            SubjectKind::Document,
            SubjectKind::DocumentVersion,
            SubjectKind::Share,
        ] {
            assert_eq!(kind.as_str().parse::<SubjectKind>().unwrap(), kind);
        }
        assert!("invoice".parse::<SubjectKind>().is_err());
    }

    #[tokio::test]
    async fn record_and_read_newest_first() {
        let db = memory_db().await;
        let finance = seed_department(&db, "Finance", "FIN").await;
        let ana = seed_user(&db, "Ana", Some(finance.id), RoleKind::Staff).await;
        let doc = seed_document(&db, &ana, finance.id, None, "Budget.xlsx").await;
        let log = ActivityLog::new(db.clone());

        log.record(Some(ana.id), Subject::document(doc.id), action::CREATED, None).await;
        log.record(Some(ana.id), Subject::document(doc.id), action::RENAMED, Some("Budget 2025".into()))
            .await;
        log.record(None, Subject::department(finance.id), action::UPDATED, None).await;

        let page = log.for_subject(Subject::document(doc.id), PageQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].action, action::RENAMED);
        assert_eq!(page.items[1].action, action::CREATED);
        assert_eq!(page.items[0].actor_name.as_deref(), Some("Ana"));
        assert_eq!(page.items[0].subject_label.as_deref(), Some("Budget.xlsx"));

        let mine = log.by_actor(ana.id, PageQuery::new(1, 1)).await.unwrap();
        assert_eq!(mine.total, 2);
        assert_eq!(mine.items.len(), 1);
    }

    #[tokio::test]
    async fn missing_subject_has_no_label() {
        let db = memory_db().await;
        let log = ActivityLog::new(db.clone());
        log.record(None, Subject::share(404), action::UNSHARED, None).await;

        let page = log.for_subject(Subject::share(404), PageQuery::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].subject_label, None);
        assert_eq!(subject_label(&db, Subject::user(404)).await.unwrap(), None);
    }
}
