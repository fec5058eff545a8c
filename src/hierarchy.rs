//! Department / folder / document hierarchy
//!
//! Folders form a tree per department through `parent_id`. Every mutation
//! here runs in one transaction; activity entries and notifications are
//! emitted after the commit.
//!
//! Invariants kept by this module:
//! - a folder's parent is live and in the same department as the folder
//! - the tree is acyclic (a folder never moves below itself)
//! - deleting a folder soft-deletes its whole subtree with one timestamp,
//!   and restoring it brings back exactly that subtree

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::activity::{action, Subject};
use crate::convert::build_preview;
use crate::entity::document::{format_size, DocumentStatus};
use crate::entity::role::RoleKind;
use crate::entity::{department, document, document_type, folder, role, user};
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::notify::{render_change, ChangeType};
use crate::permission::{
    can_modify, require_modify, require_read, resolve_access, ItemInfo, ItemRef, ItemType,
    Permission,
};
use crate::state::AppState;
use crate::storage::StoredFile;
use crate::versioning::insert_next_version;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn clean_name(name: &str, what: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", what)));
    }
    if name.chars().count() > 255 {
        return Err(AppError::Validation(format!("{} is longer than 255 characters", what)));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(AppError::Validation(format!("{} contains control characters", what)));
    }
    Ok(name.to_string())
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewFolder {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub department_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub department_id: i64,
    pub folder_id: Option<i64>,
    pub document_type_id: Option<i64>,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, department_id: i64) -> Self {
        Self {
            title: title.into(),
            department_id,
            ..Default::default()
        }
    }

    pub fn in_folder(mut self, folder_id: Option<i64>) -> Self {
        self.folder_id = folder_id;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FolderUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_type_id: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Children {
    pub folders: Vec<folder::Model>,
    pub documents: Vec<document::Model>,
}

pub(crate) async fn live_department<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<department::Model> {
    department::Entity::find_by_id(id)
        .one(db)
        .await?
        .filter(|d| d.deleted_at.is_none())
        .ok_or_else(|| AppError::NotFound(format!("department {}", id)))
}

pub(crate) async fn live_folder<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<folder::Model> {
    folder::Entity::find_by_id(id)
        .one(db)
        .await?
        .filter(|f| !f.is_deleted())
        .ok_or_else(|| AppError::NotFound(format!("folder {}", id)))
}

pub(crate) async fn live_document<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<document::Model> {
    document::Entity::find_by_id(id)
        .one(db)
        .await?
        .filter(|d| !d.is_deleted())
        .ok_or(AppError::DocumentNotFound(id))
}

/// The folder itself followed by each ancestor up to the department root
pub async fn folder_ancestors<C: ConnectionTrait>(db: &C, folder_id: i64) -> AppResult<Vec<i64>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(folder_id);

    while let Some(id) = current {
        if !seen.insert(id) {
            tracing::error!("Folder tree contains a cycle at folder {}", id);
            break;
        }
        let Some(row) = folder::Entity::find_by_id(id).one(db).await? else {
            break;
        };
        chain.push(id);
        current = row.parent_id;
    }

    Ok(chain)
}

/// Which descendants to collect
#[derive(Clone, Copy, Debug)]
enum Scope<'a> {
    All,
    Live,
    Batch(&'a str),
}

/// Breadth-first collection of descendant folder ids (excluding the root)
async fn descendant_folders<C: ConnectionTrait>(db: &C, root: i64, scope: Scope<'_>) -> AppResult<Vec<i64>> {
    let mut found = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        let mut query = folder::Entity::find().filter(folder::Column::ParentId.is_in(frontier.clone()));
        query = match scope {
            Scope::All => query,
            Scope::Live => query.filter(folder::Column::DeletedAt.is_null()),
            Scope::Batch(batch) => query.filter(folder::Column::DeletedBatch.eq(batch)),
        };

        let children = query.all(db).await?;
        frontier = children
            .into_iter()
            .map(|f| f.id)
            .filter(|id| seen.insert(*id))
            .collect();
        found.extend(frontier.iter().copied());
    }

    Ok(found)
}

/// Validate a target folder for placing something in `department_id`
async fn check_parent<C: ConnectionTrait>(
    db: &C,
    parent_id: i64,
    department_id: i64,
) -> AppResult<folder::Model> {
    let parent = live_folder(db, parent_id).await?;
    if parent.department_id != department_id {
        return Err(AppError::InvalidParent(format!(
            "folder {} belongs to another department",
            parent_id
        )));
    }
    Ok(parent)
}

/// Whether the actor may add content at a location
async fn can_write_into<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    department_id: i64,
    parent: Option<&folder::Model>,
) -> AppResult<bool> {
    if actor.admin_of(department_id) || actor.member_of(department_id) {
        return Ok(true);
    }
    match parent {
        Some(parent) => {
            let info = ItemInfo::from(parent);
            let permission = resolve_access(db, actor, &info).await?;
            Ok(can_modify(permission, info.owner_id, actor.id, false))
        }
        None => Ok(false),
    }
}

pub async fn create_folder(state: &AppState, actor: &CurrentUser, new: NewFolder) -> AppResult<folder::Model> {
    let name = clean_name(&new.name, "folder name")?;

    let txn = state.db.begin().await?;
    live_department(&txn, new.department_id).await?;
    let parent = match new.parent_id {
        Some(parent_id) => Some(check_parent(&txn, parent_id, new.department_id).await?),
        None => None,
    };
    if !can_write_into(&txn, actor, new.department_id, parent.as_ref()).await? {
        return Err(AppError::Forbidden);
    }

    let ts = now();
    let created = folder::ActiveModel {
        name: Set(name),
        description: Set(new.description),
        parent_id: Set(new.parent_id),
        department_id: Set(new.department_id),
        owner_id: Set(actor.id),
        created_at: Set(ts),
        updated_at: Set(ts),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!("Folder {} created by user {}", created.id, actor.id);
    state
        .activity
        .record(Some(actor.id), Subject::folder(created.id), action::CREATED, Some(created.name.clone()))
        .await;

    Ok(created)
}

/// Create a document from an already stored upload; the upload becomes version 1
pub async fn create_document(
    state: &AppState,
    actor: &CurrentUser,
    new: NewDocument,
    stored: &StoredFile,
) -> AppResult<document::Model> {
    let result = async {
        let title = clean_name(&new.title, "title")?;

        let txn = state.db.begin().await?;
        live_department(&txn, new.department_id).await?;
        let parent = match new.folder_id {
            Some(folder_id) => Some(check_parent(&txn, folder_id, new.department_id).await?),
            None => None,
        };
        if !can_write_into(&txn, actor, new.department_id, parent.as_ref()).await? {
            return Err(AppError::Forbidden);
        }
        if let Some(type_id) = new.document_type_id {
            document_type::Entity::find_by_id(type_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("document type {}", type_id)))?;
        }

        let ts = now();
        let doc = document::ActiveModel {
            title: Set(title),
            description: Set(new.description),
            file_path: Set(stored.relative_path.clone()),
            preview_path: Set(None),
            original_name: Set(stored.original_name.clone()),
            mime_type: Set(stored.mime_type.clone()),
            size: Set(stored.size),
            department_id: Set(new.department_id),
            document_type_id: Set(new.document_type_id),
            folder_id: Set(new.folder_id),
            uploaded_by: Set(actor.id),
            owner_id: Set(actor.id),
            status: Set(DocumentStatus::Draft.as_str().to_string()),
            rejection_reason: Set(None),
            uploaded_at: Set(ts),
            updated_at: Set(ts),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        insert_next_version(&txn, doc.id, actor.id, stored).await?;
        txn.commit().await?;
        Ok(doc)
    }
    .await;

    let mut doc = match result {
        Ok(doc) => doc,
        Err(e) => {
            state.store.discard(&stored.relative_path).await;
            return Err(e);
        }
    };

    if let Some(preview) =
        build_preview(state.converter(), &state.store, &doc.file_path, &doc.mime_type).await
    {
        let mut active: document::ActiveModel = doc.into();
        active.preview_path = Set(Some(preview));
        doc = active.update(&state.db).await?;
    }

    tracing::info!("Document {} uploaded by user {}", doc.id, actor.id);
    state
        .activity
        .record(Some(actor.id), Subject::document(doc.id), action::UPLOADED, Some(doc.original_name.clone()))
        .await;

    Ok(doc)
}

/// Live folders and documents directly under a folder (None = department root)
pub async fn list_children(
    state: &AppState,
    actor: &CurrentUser,
    department_id: i64,
    folder_id: Option<i64>,
) -> AppResult<Children> {
    let db = &state.db;
    live_department(db, department_id).await?;

    let in_department = actor.admin_of(department_id) || actor.member_of(department_id);
    match folder_id {
        Some(id) => {
            let parent = check_parent(db, id, department_id).await?;
            if !in_department && resolve_access(db, actor, &ItemInfo::from(&parent)).await?.is_none() {
                return Err(AppError::Forbidden);
            }
        }
        None if !in_department => return Err(AppError::Forbidden),
        None => {}
    }

    let folder_parent = match folder_id {
        Some(id) => folder::Column::ParentId.eq(id),
        None => folder::Column::ParentId.is_null(),
    };
    let folders = folder::Entity::find()
        .filter(folder::Column::DepartmentId.eq(department_id))
        .filter(folder_parent)
        .filter(folder::Column::DeletedAt.is_null())
        .order_by_asc(folder::Column::Name)
        .all(db)
        .await?;

    let doc_parent = match folder_id {
        Some(id) => document::Column::FolderId.eq(id),
        None => document::Column::FolderId.is_null(),
    };
    let documents = document::Entity::find()
        .filter(document::Column::DepartmentId.eq(department_id))
        .filter(doc_parent)
        .filter(document::Column::DeletedAt.is_null())
        .order_by_asc(document::Column::Title)
        .all(db)
        .await?;

    Ok(Children { folders, documents })
}

pub async fn get_folder(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<(folder::Model, Permission)> {
    let (_, permission) = require_read(&state.db, actor, ItemRef::Folder(id)).await?;
    Ok((live_folder(&state.db, id).await?, permission))
}

pub async fn get_document(
    state: &AppState,
    actor: &CurrentUser,
    id: i64,
) -> AppResult<(document::Model, Permission)> {
    let (_, permission) = require_read(&state.db, actor, ItemRef::Document(id)).await?;
    Ok((live_document(&state.db, id).await?, permission))
}

pub async fn update_folder(
    state: &AppState,
    actor: &CurrentUser,
    id: i64,
    update: FolderUpdate,
) -> AppResult<folder::Model> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Folder(id)).await?;
    let current = live_folder(&txn, id).await?;
    let old_name = current.name.clone();

    let mut active: folder::ActiveModel = current.into();
    let mut renamed = false;
    if let Some(name) = update.name {
        let name = clean_name(&name, "folder name")?;
        renamed = name != old_name;
        active.name = Set(name);
    }
    if let Some(description) = update.description {
        active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
    }
    active.updated_at = Set(now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    let (label, details) = if renamed {
        (action::RENAMED, Some(format!("{} -> {}", old_name, updated.name)))
    } else {
        (action::UPDATED, None)
    };
    state.activity.record(Some(actor.id), Subject::folder(id), label, details).await;

    Ok(updated)
}

pub async fn update_document(
    state: &AppState,
    actor: &CurrentUser,
    id: i64,
    update: DocumentUpdate,
) -> AppResult<document::Model> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Document(id)).await?;
    let current = live_document(&txn, id).await?;
    let old_title = current.title.clone();

    if let Some(type_id) = update.document_type_id {
        document_type::Entity::find_by_id(type_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document type {}", type_id)))?;
    }

    let mut active: document::ActiveModel = current.into();
    let mut renamed = false;
    if let Some(title) = update.title {
        let title = clean_name(&title, "title")?;
        renamed = title != old_title;
        active.title = Set(title);
    }
    if let Some(description) = update.description {
        active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
    }
    if let Some(type_id) = update.document_type_id {
        active.document_type_id = Set(Some(type_id));
    }
    active.updated_at = Set(now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    if renamed {
        state
            .activity
            .record(
                Some(actor.id),
                Subject::document(id),
                action::RENAMED,
                Some(format!("{} -> {}", old_title, updated.title)),
            )
            .await;
        notify_owner(state, actor, &updated, ChangeType::Renamed);
    } else {
        state.activity.record(Some(actor.id), Subject::document(id), action::UPDATED, None).await;
    }

    Ok(updated)
}

pub async fn rename_folder(state: &AppState, actor: &CurrentUser, id: i64, name: &str) -> AppResult<folder::Model> {
    let update = FolderUpdate {
        name: Some(name.to_string()),
        ..Default::default()
    };
    update_folder(state, actor, id, update).await
}

pub async fn rename_document(
    state: &AppState,
    actor: &CurrentUser,
    id: i64,
    title: &str,
) -> AppResult<document::Model> {
    let update = DocumentUpdate {
        title: Some(title.to_string()),
        ..Default::default()
    };
    update_document(state, actor, id, update).await
}

/// Move a folder under `new_parent` (None = root of its department).
///
/// A target in another department is refused unless `allow_cross_department`,
/// in which case the whole subtree moves to that department.
pub async fn move_folder(
    state: &AppState,
    actor: &CurrentUser,
    folder_id: i64,
    new_parent: Option<i64>,
    allow_cross_department: bool,
) -> AppResult<folder::Model> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Folder(folder_id)).await?;
    let current = live_folder(&txn, folder_id).await?;

    let target_department = match new_parent {
        Some(parent_id) => {
            if parent_id == folder_id {
                return Err(AppError::CycleDetected(folder_id));
            }
            let parent = live_folder(&txn, parent_id).await?;
            if folder_ancestors(&txn, parent_id).await?.contains(&folder_id) {
                return Err(AppError::CycleDetected(folder_id));
            }
            if parent.department_id != current.department_id && !allow_cross_department {
                return Err(AppError::CrossDepartment);
            }
            if !can_write_into(&txn, actor, parent.department_id, Some(&parent)).await? {
                return Err(AppError::Forbidden);
            }
            parent.department_id
        }
        None => {
            if !can_write_into(&txn, actor, current.department_id, None).await? {
                return Err(AppError::Forbidden);
            }
            current.department_id
        }
    };

    let ts = now();
    if target_department != current.department_id {
        let mut subtree = descendant_folders(&txn, folder_id, Scope::All).await?;
        subtree.push(folder_id);

        folder::Entity::update_many()
            .col_expr(folder::Column::DepartmentId, Expr::value(target_department))
            .col_expr(folder::Column::UpdatedAt, Expr::value(ts))
            .filter(folder::Column::Id.is_in(subtree.clone()))
            .exec(&txn)
            .await?;
        document::Entity::update_many()
            .col_expr(document::Column::DepartmentId, Expr::value(target_department))
            .col_expr(document::Column::UpdatedAt, Expr::value(ts))
            .filter(document::Column::FolderId.is_in(subtree))
            .exec(&txn)
            .await?;
        tracing::info!(
            "Folder {} moved from department {} to {}",
            folder_id,
            current.department_id,
            target_department
        );
    }

    let mut active: folder::ActiveModel = live_folder(&txn, folder_id).await?.into();
    active.parent_id = Set(new_parent);
    active.department_id = Set(target_department);
    active.updated_at = Set(ts);
    let moved = active.update(&txn).await?;
    txn.commit().await?;

    state
        .activity
        .record(Some(actor.id), Subject::folder(folder_id), action::MOVED, Some(destination(new_parent)))
        .await;

    Ok(moved)
}

pub async fn move_document(
    state: &AppState,
    actor: &CurrentUser,
    document_id: i64,
    new_folder: Option<i64>,
    allow_cross_department: bool,
) -> AppResult<document::Model> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Document(document_id)).await?;
    let current = live_document(&txn, document_id).await?;

    let target_department = match new_folder {
        Some(folder_id) => {
            let target = live_folder(&txn, folder_id).await?;
            if target.department_id != current.department_id && !allow_cross_department {
                return Err(AppError::CrossDepartment);
            }
            if !can_write_into(&txn, actor, target.department_id, Some(&target)).await? {
                return Err(AppError::Forbidden);
            }
            target.department_id
        }
        None => {
            if !can_write_into(&txn, actor, current.department_id, None).await? {
                return Err(AppError::Forbidden);
            }
            current.department_id
        }
    };

    let mut active: document::ActiveModel = current.into();
    active.folder_id = Set(new_folder);
    active.department_id = Set(target_department);
    active.updated_at = Set(now());
    let moved = active.update(&txn).await?;
    txn.commit().await?;

    state
        .activity
        .record(Some(actor.id), Subject::document(document_id), action::MOVED, Some(destination(new_folder)))
        .await;
    notify_owner(state, actor, &moved, ChangeType::Moved);

    Ok(moved)
}

fn destination(parent: Option<i64>) -> String {
    match parent {
        Some(id) => format!("to folder {}", id),
        None => "to department root".to_string(),
    }
}

/// Soft-delete a folder, its descendant folders and their documents as one batch
pub async fn soft_delete_folder(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<()> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Folder(id)).await?;

    let mut subtree = descendant_folders(&txn, id, Scope::Live).await?;
    subtree.push(id);
    let ts = now();
    let batch = uuid::Uuid::new_v4().to_string();

    folder::Entity::update_many()
        .col_expr(folder::Column::DeletedAt, Expr::value(ts))
        .col_expr(folder::Column::DeletedBatch, Expr::value(batch.clone()))
        .filter(folder::Column::Id.is_in(subtree.clone()))
        .filter(folder::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;
    let docs = document::Entity::update_many()
        .col_expr(document::Column::DeletedAt, Expr::value(ts))
        .col_expr(document::Column::DeletedBatch, Expr::value(batch))
        .filter(document::Column::FolderId.is_in(subtree.clone()))
        .filter(document::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;
    txn.commit().await?;

    tracing::info!(
        "Folder {} deleted with {} subfolders and {} documents",
        id,
        subtree.len() - 1,
        docs.rows_affected
    );
    state.activity.record(Some(actor.id), Subject::folder(id), action::DELETED, None).await;
    Ok(())
}

/// Owner or department admin, for rows that may already be deleted
fn may_restore(actor: &CurrentUser, owner_id: i64, department_id: i64) -> bool {
    owner_id == actor.id || actor.admin_of(department_id)
}

/// Undo exactly the cascade `soft_delete_folder` applied
pub async fn restore_folder(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<folder::Model> {
    let txn = state.db.begin().await?;
    let current = folder::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("folder {}", id)))?;
    if current.deleted_at.is_none() {
        return Err(AppError::Conflict(format!("folder {} is not deleted", id)));
    }
    let Some(batch) = current.deleted_batch.clone() else {
        return Err(AppError::Conflict(format!("folder {} has no delete batch", id)));
    };
    if !may_restore(actor, current.owner_id, current.department_id) {
        return Err(AppError::Forbidden);
    }
    if let Some(parent_id) = current.parent_id {
        if live_folder(&txn, parent_id).await.is_err() {
            return Err(AppError::Conflict(format!(
                "parent folder {} is deleted, restore it first",
                parent_id
            )));
        }
    }
    live_department(&txn, current.department_id).await?;

    let mut subtree = descendant_folders(&txn, id, Scope::Batch(&batch)).await?;
    subtree.push(id);

    folder::Entity::update_many()
        .col_expr(folder::Column::DeletedAt, Expr::value(Option::<i64>::None))
        .col_expr(folder::Column::DeletedBatch, Expr::value(Option::<String>::None))
        .filter(folder::Column::Id.is_in(subtree.clone()))
        .filter(folder::Column::DeletedBatch.eq(batch.as_str()))
        .exec(&txn)
        .await?;
    document::Entity::update_many()
        .col_expr(document::Column::DeletedAt, Expr::value(Option::<i64>::None))
        .col_expr(document::Column::DeletedBatch, Expr::value(Option::<String>::None))
        .filter(document::Column::FolderId.is_in(subtree))
        .filter(document::Column::DeletedBatch.eq(batch.as_str()))
        .exec(&txn)
        .await?;
    let restored = live_folder(&txn, id).await?;
    txn.commit().await?;

    state.activity.record(Some(actor.id), Subject::folder(id), action::RESTORED, None).await;
    Ok(restored)
}

pub async fn soft_delete_document(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<()> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Document(id)).await?;
    let mut active: document::ActiveModel = live_document(&txn, id).await?.into();
    active.deleted_at = Set(Some(now()));
    active.update(&txn).await?;
    txn.commit().await?;

    state.activity.record(Some(actor.id), Subject::document(id), action::DELETED, None).await;
    Ok(())
}

pub async fn restore_document(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<document::Model> {
    let txn = state.db.begin().await?;
    let current = document::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::DocumentNotFound(id))?;
    if current.deleted_at.is_none() {
        return Err(AppError::Conflict(format!("document {} is not deleted", id)));
    }
    if !may_restore(actor, current.owner_id, current.department_id) {
        return Err(AppError::Forbidden);
    }
    if let Some(folder_id) = current.folder_id {
        if live_folder(&txn, folder_id).await.is_err() {
            return Err(AppError::Conflict(format!(
                "folder {} is deleted, restore it first",
                folder_id
            )));
        }
    }

    let mut active: document::ActiveModel = current.into();
    active.deleted_at = Set(None);
    active.deleted_batch = Set(None);
    let restored = active.update(&txn).await?;
    txn.commit().await?;

    state.activity.record(Some(actor.id), Subject::document(id), action::RESTORED, None).await;
    Ok(restored)
}

/// Soft-delete a department; refused while anything live still points at it
pub async fn soft_delete_department(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<()> {
    if !actor.is_super_admin() {
        return Err(AppError::Forbidden);
    }

    let txn = state.db.begin().await?;
    let current = live_department(&txn, id).await?;

    let folders = folder::Entity::find()
        .filter(folder::Column::DepartmentId.eq(id))
        .filter(folder::Column::DeletedAt.is_null())
        .count(&txn)
        .await?;
    let documents = document::Entity::find()
        .filter(document::Column::DepartmentId.eq(id))
        .filter(document::Column::DeletedAt.is_null())
        .count(&txn)
        .await?;
    let users = user::Entity::find()
        .filter(user::Column::DepartmentId.eq(id))
        .filter(user::Column::DeletedAt.is_null())
        .count(&txn)
        .await?;
    if folders + documents + users > 0 {
        return Err(AppError::Conflict(format!(
            "department {} still has {} folders, {} documents and {} users",
            current.code, folders, documents, users
        )));
    }

    let mut active: department::ActiveModel = current.into();
    active.deleted_at = Set(Some(now()));
    active.update(&txn).await?;
    txn.commit().await?;

    state.activity.record(Some(actor.id), Subject::department(id), action::DELETED, None).await;
    Ok(())
}

/// Owner or editor sends a draft (or rejected) document to QA review
pub async fn submit_for_review(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<document::Model> {
    let txn = state.db.begin().await?;
    require_modify(&txn, actor, ItemRef::Document(id)).await?;
    let current = live_document(&txn, id).await?;
    if !current.status().can_submit() {
        return Err(AppError::Conflict(format!(
            "document {} is {} and cannot be submitted",
            id, current.status
        )));
    }

    let mut active: document::ActiveModel = current.into();
    active.status = Set(DocumentStatus::PendingReview.as_str().to_string());
    active.rejection_reason = Set(None);
    active.updated_at = Set(now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    state.activity.record(Some(actor.id), Subject::document(id), action::SUBMITTED, None).await;

    let reviewers = department_admin_ids(&state.db, updated.department_id).await?;
    let notice = render_change(
        &actor.name,
        ItemType::Document,
        updated.id,
        &updated.title,
        &ChangeType::SubmittedForReview,
    );
    state.notifier.notify_users(&state.db, reviewers, Some(actor.id), notice);

    Ok(updated)
}

pub async fn approve(state: &AppState, actor: &CurrentUser, id: i64) -> AppResult<document::Model> {
    review(state, actor, id, ChangeType::Approved).await
}

pub async fn reject(
    state: &AppState,
    actor: &CurrentUser,
    id: i64,
    reason: Option<&str>,
) -> AppResult<document::Model> {
    review(state, actor, id, ChangeType::rejected(reason)).await
}

async fn review(
    state: &AppState,
    actor: &CurrentUser,
    id: i64,
    decision: ChangeType,
) -> AppResult<document::Model> {
    let txn = state.db.begin().await?;
    let current = live_document(&txn, id).await?;
    if !actor.admin_of(current.department_id) {
        return Err(AppError::Forbidden);
    }
    if current.status() != DocumentStatus::PendingReview {
        return Err(AppError::Conflict(format!(
            "document {} is {}, not pending review",
            id, current.status
        )));
    }

    let (status, label) = match &decision {
        ChangeType::Approved => (DocumentStatus::Approved, action::APPROVED),
        _ => (DocumentStatus::Rejected, action::REJECTED),
    };

    let mut active: document::ActiveModel = current.into();
    active.status = Set(status.as_str().to_string());
    active.rejection_reason = Set(decision.reason().map(str::to_string));
    active.updated_at = Set(now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    state
        .activity
        .record(Some(actor.id), Subject::document(id), label, decision.reason().map(str::to_string))
        .await;
    notify_owner(state, actor, &updated, decision);

    Ok(updated)
}

/// Live Admin-role users of a department; Super Admins when there are none
async fn department_admin_ids<C: ConnectionTrait>(db: &C, department_id: i64) -> AppResult<Vec<i64>> {
    let roles: HashMap<String, i64> = role::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.name, r.id))
        .collect();

    let admins_of = |kind: RoleKind| roles.get(kind.as_str()).copied();

    let mut ids = Vec::new();
    if let Some(admin_role) = admins_of(RoleKind::Admin) {
        ids = user::Entity::find()
            .filter(user::Column::RoleId.eq(admin_role))
            .filter(user::Column::DepartmentId.eq(department_id))
            .filter(user::Column::DeletedAt.is_null())
            .all(db)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
    }
    if ids.is_empty() {
        if let Some(super_role) = admins_of(RoleKind::SuperAdmin) {
            ids = user::Entity::find()
                .filter(user::Column::RoleId.eq(super_role))
                .filter(user::Column::DeletedAt.is_null())
                .all(db)
                .await?
                .into_iter()
                .map(|u| u.id)
                .collect();
        }
    }
    Ok(ids)
}

/// Tell a document's owner someone else changed it
fn notify_owner(state: &AppState, actor: &CurrentUser, doc: &document::Model, change: ChangeType) {
    if doc.owner_id == actor.id {
        return;
    }
    let notice = render_change(&actor.name, ItemType::Document, doc.id, &doc.title, &change);
    state
        .notifier
        .notify_users(&state.db, vec![doc.owner_id], Some(actor.id), notice);
}

/// Filters for the flat document listing
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DocumentFilter {
    pub department_id: Option<i64>,
    pub folder_id: Option<i64>,
    pub status: Option<String>,
    /// Case-insensitive title search
    pub q: Option<String>,
}

/// Live documents in the departments the actor belongs to or administers
pub async fn list_documents(
    state: &AppState,
    actor: &CurrentUser,
    filter: DocumentFilter,
) -> AppResult<Vec<document::Model>> {
    let mut query = document::Entity::find().filter(document::Column::DeletedAt.is_null());

    match filter.department_id {
        Some(dept) if actor.admin_of(dept) || actor.member_of(dept) => {
            query = query.filter(document::Column::DepartmentId.eq(dept));
        }
        Some(_) => return Err(AppError::Forbidden),
        None if actor.is_super_admin() => {}
        None => match actor.department_id {
            Some(dept) => query = query.filter(document::Column::DepartmentId.eq(dept)),
            None => return Ok(Vec::new()),
        },
    }
    if let Some(folder_id) = filter.folder_id {
        query = query.filter(document::Column::FolderId.eq(folder_id));
    }
    if let Some(status) = filter.status.as_deref() {
        let status: DocumentStatus = status.parse().map_err(AppError::Validation)?;
        query = query.filter(document::Column::Status.eq(status.as_str()));
    }

    let mut documents = query.order_by_desc(document::Column::UpdatedAt).all(&state.db).await?;
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let needle = q.to_lowercase();
        documents.retain(|d| d.title.to_lowercase().contains(&needle));
    }
    Ok(documents)
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DocumentStatistics {
    pub total_documents: u64,
    pub total_bytes: i64,
    pub total_size_human: String,
    pub by_status: HashMap<String, u64>,
    pub by_mime_type: HashMap<String, u64>,
}

/// Totals over live documents: everything for a Super Admin, the actor's
/// department otherwise
pub async fn document_statistics(state: &AppState, actor: &CurrentUser) -> AppResult<DocumentStatistics> {
    let mut query = document::Entity::find().filter(document::Column::DeletedAt.is_null());
    if !actor.is_super_admin() {
        match actor.department_id {
            Some(dept) => query = query.filter(document::Column::DepartmentId.eq(dept)),
            None => {
                return Ok(DocumentStatistics {
                    total_size_human: format_size(0),
                    ..Default::default()
                })
            }
        }
    }

    let documents = query.all(&state.db).await?;
    let mut stats = DocumentStatistics::default();
    for doc in &documents {
        stats.total_documents += 1;
        stats.total_bytes += doc.size;
        *stats.by_status.entry(doc.status.clone()).or_default() += 1;
        *stats.by_mime_type.entry(doc.mime_type.clone()).or_default() += 1;
    }
    stats.total_size_human = format_size(stats.total_bytes);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use crate::storage::DOCUMENTS;
    use crate::test_util::{seed_department, seed_folder, seed_user, TestApp};

    async fn new_folder(app: &TestApp, actor: &CurrentUser, dept: i64, parent: Option<i64>, name: &str) -> folder::Model {
        create_folder(
            &app.state,
            actor,
            NewFolder {
                name: name.to_string(),
                description: None,
                department_id: dept,
                parent_id: parent,
            },
        )
        .await
        .unwrap()
    }

    async fn new_document(
        app: &TestApp,
        actor: &CurrentUser,
        dept: i64,
        folder: Option<i64>,
        name: &str,
    ) -> document::Model {
        let stored = app
            .state
            .store
            .save_bytes(DOCUMENTS, name, None, b"content".to_vec())
            .await
            .unwrap();
        create_document(&app.state, actor, NewDocument::new(name, dept).in_folder(folder), &stored)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn folder_parent_must_share_department() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let hr = seed_department(&app.state.db, "HR", "HR").await;
        let root = seed_user(&app.state.db, "Root", None, RoleKind::SuperAdmin).await;

        let hr_folder = new_folder(&app, &root, hr.id, None, "Policies").await;
        let err = create_folder(
            &app.state,
            &root,
            NewFolder {
                name: "Budgets".to_string(),
                description: None,
                department_id: finance.id,
                parent_id: Some(hr_folder.id),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidParent(_)));

        let err = create_folder(
            &app.state,
            &root,
            NewFolder {
                name: "  ".to_string(),
                description: None,
                department_id: finance.id,
                parent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn non_member_cannot_create_in_department() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let hr = seed_department(&app.state.db, "HR", "HR").await;
        let outsider = seed_user(&app.state.db, "Out", Some(hr.id), RoleKind::Staff).await;

        let err = create_folder(
            &app.state,
            &outsider,
            NewFolder {
                name: "Sneaky".to_string(),
                description: None,
                department_id: finance.id,
                parent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn rename_folder_records_activity() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;
        let reports = seed_folder(&app.state.db, &ana, finance.id, None, "Reports").await;

        let renamed = rename_folder(&app.state, &ana, reports.id, "  Quarterly  ").await.unwrap();
        assert_eq!(renamed.name, "Quarterly");
        assert!(matches!(
            rename_folder(&app.state, &ana, reports.id, " ").await.unwrap_err(),
            AppError::Validation(_)
        ));

        let page = app
            .state
            .activity
            .for_subject(crate::activity::Subject::folder(reports.id), crate::activity::PageQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].action, crate::activity::action::RENAMED);
        assert_eq!(page.items[0].details.as_deref(), Some("Reports -> Quarterly"));
    }

    #[tokio::test]
    async fn list_children_at_root_and_in_folder() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;

        let reports = new_folder(&app, &ana, finance.id, None, "Reports").await;
        new_folder(&app, &ana, finance.id, None, "Archive").await;
        new_folder(&app, &ana, finance.id, Some(reports.id), "Q1").await;
        new_document(&app, &ana, finance.id, None, "Budget.xlsx").await;
        new_document(&app, &ana, finance.id, Some(reports.id), "Summary.docx").await;

        let root = list_children(&app.state, &ana, finance.id, None).await.unwrap();
        let names: Vec<_> = root.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Archive", "Reports"]);
        assert_eq!(root.documents.len(), 1);
        assert_eq!(root.documents[0].title, "Budget.xlsx");

        let inside = list_children(&app.state, &ana, finance.id, Some(reports.id)).await.unwrap();
        assert_eq!(inside.folders.len(), 1);
        assert_eq!(inside.documents[0].title, "Summary.docx");
    }

    #[tokio::test]
    async fn move_into_descendant_is_a_cycle_and_changes_nothing() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;

        let a = new_folder(&app, &ana, finance.id, None, "A").await;
        let b = new_folder(&app, &ana, finance.id, Some(a.id), "B").await;
        let c = new_folder(&app, &ana, finance.id, Some(b.id), "C").await;

        let err = move_folder(&app.state, &ana, a.id, Some(c.id), false).await.unwrap_err();
        assert!(matches!(err, AppError::CycleDetected(id) if id == a.id));
        let err = move_folder(&app.state, &ana, a.id, Some(a.id), false).await.unwrap_err();
        assert!(matches!(err, AppError::CycleDetected(_)));

        let a_now = live_folder(&app.state.db, a.id).await.unwrap();
        assert_eq!(a_now.parent_id, None);
        assert_eq!(folder_ancestors(&app.state.db, c.id).await.unwrap(), vec![c.id, b.id, a.id]);

        // a legal move still works
        let moved = move_folder(&app.state, &ana, c.id, None, false).await.unwrap();
        assert_eq!(moved.parent_id, None);
    }

    #[tokio::test]
    async fn cross_department_move_requires_opt_in_and_rehomes_subtree() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let hr = seed_department(&app.state.db, "HR", "HR").await;
        let root = seed_user(&app.state.db, "Root", None, RoleKind::SuperAdmin).await;

        let a = new_folder(&app, &root, finance.id, None, "A").await;
        let b = new_folder(&app, &root, finance.id, Some(a.id), "B").await;
        let doc = new_document(&app, &root, finance.id, Some(b.id), "Deep.pdf").await;
        let target = new_folder(&app, &root, hr.id, None, "Inbox").await;

        let err = move_folder(&app.state, &root, a.id, Some(target.id), false).await.unwrap_err();
        assert!(matches!(err, AppError::CrossDepartment));

        let moved = move_folder(&app.state, &root, a.id, Some(target.id), true).await.unwrap();
        assert_eq!(moved.department_id, hr.id);
        assert_eq!(live_folder(&app.state.db, b.id).await.unwrap().department_id, hr.id);
        assert_eq!(live_document(&app.state.db, doc.id).await.unwrap().department_id, hr.id);
    }

    #[tokio::test]
    async fn cascade_delete_and_restore() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;

        let a = new_folder(&app, &ana, finance.id, None, "A").await;
        let b = new_folder(&app, &ana, finance.id, Some(a.id), "B").await;
        let inner = new_document(&app, &ana, finance.id, Some(b.id), "Inner.docx").await;

        // deleted on their own within the same second; must stay deleted after restoring A
        let lone = new_document(&app, &ana, finance.id, Some(a.id), "Lone.docx").await;
        let c = new_folder(&app, &ana, finance.id, Some(a.id), "C").await;
        let in_c = new_document(&app, &ana, finance.id, Some(c.id), "InC.docx").await;
        soft_delete_document(&app.state, &ana, lone.id).await.unwrap();
        soft_delete_folder(&app.state, &ana, c.id).await.unwrap();

        soft_delete_folder(&app.state, &ana, a.id).await.unwrap();
        assert!(live_folder(&app.state.db, b.id).await.is_err());
        assert!(matches!(
            live_document(&app.state.db, inner.id).await,
            Err(AppError::DocumentNotFound(_))
        ));

        // child cannot come back while its parent is deleted
        assert!(matches!(
            restore_folder(&app.state, &ana, b.id).await,
            Err(AppError::Conflict(_))
        ));

        restore_folder(&app.state, &ana, a.id).await.unwrap();
        assert!(live_folder(&app.state.db, b.id).await.is_ok());
        assert!(live_document(&app.state.db, inner.id).await.is_ok());
        assert!(live_document(&app.state.db, lone.id).await.is_err());
        assert!(live_folder(&app.state.db, c.id).await.is_err());
        assert!(live_document(&app.state.db, in_c.id).await.is_err());

        // C's own batch still restores it with its content
        restore_folder(&app.state, &ana, c.id).await.unwrap();
        assert!(live_document(&app.state.db, in_c.id).await.is_ok());
    }

    #[tokio::test]
    async fn department_delete_refused_while_in_use() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let empty = seed_department(&app.state.db, "Empty", "EMP").await;
        let root = seed_user(&app.state.db, "Root", None, RoleKind::SuperAdmin).await;
        new_folder(&app, &root, finance.id, None, "Reports").await;

        assert!(matches!(
            soft_delete_department(&app.state, &root, finance.id).await,
            Err(AppError::Conflict(_))
        ));
        soft_delete_department(&app.state, &root, empty.id).await.unwrap();
        assert!(live_department(&app.state.db, empty.id).await.is_err());
    }

    #[tokio::test]
    async fn review_workflow_notifies() {
        let mut app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;
        let maria = seed_user(&app.state.db, "Maria", Some(finance.id), RoleKind::Admin).await;
        let doc = new_document(&app, &ana, finance.id, None, "Budget.xlsx").await;

        // staff cannot approve
        assert!(matches!(approve(&app.state, &ana, doc.id).await, Err(AppError::Forbidden)));
        // nothing to approve yet
        assert!(matches!(approve(&app.state, &maria, doc.id).await, Err(AppError::Conflict(_))));

        let pending = submit_for_review(&app.state, &ana, doc.id).await.unwrap();
        assert_eq!(pending.status(), DocumentStatus::PendingReview);
        let (to, notice) = app.next_notification().await;
        assert_eq!(to.user_id, maria.id);
        assert_eq!(notice.message, "Ana submitted the document \"Budget.xlsx\" for QA review.");

        let rejected = reject(&app.state, &maria, doc.id, Some("out of budget")).await.unwrap();
        assert_eq!(rejected.status(), DocumentStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("out of budget"));
        let (to, notice) = app.next_notification().await;
        assert_eq!(to.user_id, ana.id);
        assert_eq!(notice.kind, NotificationKind::DocumentChange);
        assert!(notice.message.ends_with("Reason: out of budget"));

        submit_for_review(&app.state, &ana, doc.id).await.unwrap();
        app.next_notification().await;
        let approved = approve(&app.state, &maria, doc.id).await.unwrap();
        assert_eq!(approved.status(), DocumentStatus::Approved);
        assert_eq!(approved.rejection_reason, None);
        let (_, notice) = app.next_notification().await;
        assert_eq!(notice.message, "Maria approved your document \"Budget.xlsx\".");
    }

    #[tokio::test]
    async fn rename_by_admin_notifies_owner() {
        let mut app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;
        let maria = seed_user(&app.state.db, "Maria", Some(finance.id), RoleKind::Admin).await;
        let doc = new_document(&app, &ana, finance.id, None, "Budget.xlsx").await;

        // owner renaming their own document is silent
        rename_document(&app.state, &ana, doc.id, "Budget 2025.xlsx").await.unwrap();

        let renamed = rename_document(&app.state, &maria, doc.id, "Budget FY25.xlsx").await.unwrap();
        assert_eq!(renamed.title, "Budget FY25.xlsx");

        let (to, notice) = app.next_notification().await;
        assert_eq!(to.user_id, ana.id);
        assert_eq!(notice.message, "Maria renamed your document \"Budget FY25.xlsx\".");
    }

    #[tokio::test]
    async fn statistics_are_scoped_to_department() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let hr = seed_department(&app.state.db, "HR", "HR").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;
        let hal = seed_user(&app.state.db, "Hal", Some(hr.id), RoleKind::Staff).await;
        let root = seed_user(&app.state.db, "Root", None, RoleKind::SuperAdmin).await;

        new_document(&app, &ana, finance.id, None, "Budget.xlsx").await;
        new_document(&app, &ana, finance.id, None, "Plan.pdf").await;
        new_document(&app, &hal, hr.id, None, "Policy.docx").await;

        let fin = document_statistics(&app.state, &ana).await.unwrap();
        assert_eq!(fin.total_documents, 2);
        assert_eq!(fin.total_bytes, 14);
        assert_eq!(fin.by_status.get("draft"), Some(&2));
        assert_eq!(fin.by_mime_type.get("application/pdf"), Some(&1));

        let all = document_statistics(&app.state, &root).await.unwrap();
        assert_eq!(all.total_documents, 3);
        assert_eq!(all.total_size_human, "21 B");
    }
}
