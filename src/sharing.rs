//! Sharing
//!
//! A share grants one user a permission on a folder or document owned by
//! someone else. There is at most one row per (owner, target, item); granting
//! again updates the permission in place.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::activity::{action, Subject};
use crate::entity::share::ShareResponse;
use crate::entity::{document, folder, share, user};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::notify::render_share;
use crate::permission::{load_item, ItemRef, ItemType, Permission};
use crate::state::AppState;

/// What a grant did to the share table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Share with display names resolved
#[derive(Clone, Debug, Serialize)]
pub struct ShareView {
    #[serde(flatten)]
    pub share: ShareResponse,
    pub item_name: String,
    pub owner_name: Option<String>,
    pub target_name: Option<String>,
}

/// A live item reachable through an incoming share
#[derive(Clone, Debug, Serialize)]
pub struct SharedItem<T> {
    #[serde(flatten)]
    pub item: T,
    pub permission: Permission,
    pub shared_by: i64,
}

fn item_of(model: &share::Model) -> Option<ItemRef> {
    match (model.document_id, model.folder_id) {
        (Some(id), None) => Some(ItemRef::Document(id)),
        (None, Some(id)) => Some(ItemRef::Folder(id)),
        _ => None,
    }
}

fn item_filter(item: ItemRef) -> sea_orm::Condition {
    match item {
        ItemRef::Document(id) => sea_orm::Condition::all()
            .add(share::Column::DocumentId.eq(id))
            .add(share::Column::FolderId.is_null()),
        ItemRef::Folder(id) => sea_orm::Condition::all()
            .add(share::Column::FolderId.eq(id))
            .add(share::Column::DocumentId.is_null()),
    }
}

/// One upsert attempt in its own transaction
async fn upsert_share(
    state: &AppState,
    owner_id: i64,
    target_user_id: i64,
    item: ItemRef,
    permission: Permission,
) -> Result<(share::Model, GrantOutcome), sea_orm::DbErr> {
    let txn = state.db.begin().await?;
    let now = chrono::Utc::now().timestamp();

    let existing = share::Entity::find()
        .filter(share::Column::OwnerId.eq(owner_id))
        .filter(share::Column::TargetUserId.eq(target_user_id))
        .filter(item_filter(item))
        .one(&txn)
        .await?;

    let result = match existing {
        Some(row) if row.permission == permission.as_str() => (row, GrantOutcome::Unchanged),
        Some(row) => {
            let mut active: share::ActiveModel = row.into();
            active.permission = Set(permission.as_str().to_string());
            active.updated_at = Set(now);
            (active.update(&txn).await?, GrantOutcome::Updated)
        }
        None => {
            let (document_id, folder_id) = match item {
                ItemRef::Document(id) => (Some(id), None),
                ItemRef::Folder(id) => (None, Some(id)),
            };
            let row = share::ActiveModel {
                owner_id: Set(owner_id),
                target_user_id: Set(target_user_id),
                document_id: Set(document_id),
                folder_id: Set(folder_id),
                permission: Set(permission.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            (row, GrantOutcome::Created)
        }
    };

    txn.commit().await?;
    Ok(result)
}

/// Share an item the actor owns with another user
pub async fn grant(
    state: &AppState,
    actor: &CurrentUser,
    target_user_id: i64,
    item: ItemRef,
    permission: Permission,
) -> AppResult<(share::Model, GrantOutcome)> {
    let info = load_item(&state.db, item).await?;
    if info.owner_id != actor.id {
        return Err(AppError::NotOwner);
    }
    if target_user_id == actor.id {
        return Err(AppError::BadRequest("cannot share an item with yourself".to_string()));
    }
    user::Entity::find_by_id(target_user_id)
        .one(&state.db)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or_else(|| AppError::NotFound(format!("user {}", target_user_id)))?;

    // A concurrent grant may insert between our lookup and insert; the
    // second attempt then finds the row and updates it.
    let (row, outcome) = match upsert_share(state, actor.id, target_user_id, item, permission).await {
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!("Share insert raced for item {:?}, retrying as update", item);
            upsert_share(state, actor.id, target_user_id, item, permission).await?
        }
        other => other?,
    };

    if outcome != GrantOutcome::Unchanged {
        tracing::info!(
            "User {} shared {} {} with user {} as {}",
            actor.id,
            item.item_type(),
            item.id(),
            target_user_id,
            permission
        );
        state
            .activity
            .record(
                Some(actor.id),
                Subject::share(row.id),
                action::SHARED,
                Some(format!("{} {} to user {} as {}", item.item_type(), item.id(), target_user_id, permission)),
            )
            .await;

        let notice = render_share(&actor.name, item.item_type(), item.id(), &info.name, permission);
        state
            .notifier
            .notify_users(&state.db, vec![target_user_id], Some(actor.id), notice);
    }

    Ok((row, outcome))
}

/// Department of an item, deleted or not
async fn item_department<C: ConnectionTrait>(db: &C, item: ItemRef) -> AppResult<Option<i64>> {
    Ok(match item {
        ItemRef::Document(id) => document::Entity::find_by_id(id).one(db).await?.map(|d| d.department_id),
        ItemRef::Folder(id) => folder::Entity::find_by_id(id).one(db).await?.map(|f| f.department_id),
    })
}

/// Remove a share; access through it ends immediately
pub async fn revoke(state: &AppState, actor: &CurrentUser, share_id: i64) -> AppResult<()> {
    let row = share::Entity::find_by_id(share_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("share {}", share_id)))?;

    let allowed = row.owner_id == actor.id || actor.is_super_admin() || {
        let department = match item_of(&row) {
            Some(item) => item_department(&state.db, item).await?,
            None => None,
        };
        department.map(|d| actor.admin_of(d)).unwrap_or(false)
    };
    if !allowed {
        return Err(AppError::Forbidden);
    }

    share::Entity::delete_by_id(share_id).exec(&state.db).await?;

    tracing::info!("Share {} revoked by user {}", share_id, actor.id);
    state
        .activity
        .record(
            Some(actor.id),
            Subject::share(share_id),
            action::UNSHARED,
            Some(format!("user {} lost {}", row.target_user_id, row.permission)),
        )
        .await;
    Ok(())
}

/// Attach item and user names; shares on deleted items are dropped
async fn with_names<C: ConnectionTrait>(db: &C, rows: Vec<share::Model>) -> AppResult<Vec<ShareView>> {
    let doc_ids: Vec<i64> = rows.iter().filter_map(|r| r.document_id).collect();
    let folder_ids: Vec<i64> = rows.iter().filter_map(|r| r.folder_id).collect();
    let user_ids: HashSet<i64> = rows.iter().flat_map(|r| [r.owner_id, r.target_user_id]).collect();

    let doc_names: HashMap<i64, String> = document::Entity::find()
        .filter(document::Column::Id.is_in(doc_ids))
        .filter(document::Column::DeletedAt.is_null())
        .all(db)
        .await?
        .into_iter()
        .map(|d| (d.id, d.title))
        .collect();
    let folder_names: HashMap<i64, String> = folder::Entity::find()
        .filter(folder::Column::Id.is_in(folder_ids))
        .filter(folder::Column::DeletedAt.is_null())
        .all(db)
        .await?
        .into_iter()
        .map(|f| (f.id, f.name))
        .collect();
    let user_names: HashMap<i64, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let item_name = match item_of(&row)? {
                ItemRef::Document(id) => doc_names.get(&id)?.clone(),
                ItemRef::Folder(id) => folder_names.get(&id)?.clone(),
            };
            Some(ShareView {
                owner_name: user_names.get(&row.owner_id).cloned(),
                target_name: user_names.get(&row.target_user_id).cloned(),
                item_name,
                share: row.into(),
            })
        })
        .collect())
}

/// Shares granted to the user
pub async fn incoming(state: &AppState, user_id: i64) -> AppResult<Vec<ShareView>> {
    let rows = share::Entity::find()
        .filter(share::Column::TargetUserId.eq(user_id))
        .order_by_desc(share::Column::UpdatedAt)
        .all(&state.db)
        .await?;
    with_names(&state.db, rows).await
}

/// Shares the user has granted
pub async fn outgoing(state: &AppState, user_id: i64) -> AppResult<Vec<ShareView>> {
    let rows = share::Entity::find()
        .filter(share::Column::OwnerId.eq(user_id))
        .order_by_desc(share::Column::UpdatedAt)
        .all(&state.db)
        .await?;
    with_names(&state.db, rows).await
}

/// Every share on one item; owner or admin only
pub async fn item_shares(state: &AppState, actor: &CurrentUser, item: ItemRef) -> AppResult<Vec<ShareView>> {
    let info = load_item(&state.db, item).await?;
    if info.owner_id != actor.id && !actor.admin_of(info.department_id) {
        return Err(AppError::Forbidden);
    }

    let rows = share::Entity::find()
        .filter(item_filter(item))
        .order_by_asc(share::Column::CreatedAt)
        .all(&state.db)
        .await?;
    with_names(&state.db, rows).await
}

/// Highest permission and granting owner per item id for one item type
async fn incoming_grants(
    state: &AppState,
    user_id: i64,
    item_type: ItemType,
) -> AppResult<HashMap<i64, (Permission, i64)>> {
    let column = match item_type {
        ItemType::Document => share::Column::DocumentId,
        ItemType::Folder => share::Column::FolderId,
    };
    let rows = share::Entity::find()
        .filter(share::Column::TargetUserId.eq(user_id))
        .filter(column.is_not_null())
        .all(&state.db)
        .await?;

    let mut grants: HashMap<i64, (Permission, i64)> = HashMap::new();
    for row in rows {
        let Some(item) = item_of(&row) else { continue };
        let Ok(permission) = row.permission.parse::<Permission>() else {
            continue;
        };
        let entry = grants.entry(item.id()).or_insert((permission, row.owner_id));
        if permission > entry.0 {
            *entry = (permission, row.owner_id);
        }
    }
    Ok(grants)
}

/// Live documents shared directly with the user
pub async fn shared_documents(state: &AppState, user_id: i64) -> AppResult<Vec<SharedItem<document::Model>>> {
    let grants = incoming_grants(state, user_id, ItemType::Document).await?;
    let docs = document::Entity::find()
        .filter(document::Column::Id.is_in(grants.keys().copied().collect::<Vec<_>>()))
        .filter(document::Column::DeletedAt.is_null())
        .order_by_asc(document::Column::Title)
        .all(&state.db)
        .await?;

    Ok(docs
        .into_iter()
        .filter_map(|doc| {
            let (permission, shared_by) = *grants.get(&doc.id)?;
            Some(SharedItem { item: doc, permission, shared_by })
        })
        .collect())
}

/// Live folders shared directly with the user
pub async fn shared_folders(state: &AppState, user_id: i64) -> AppResult<Vec<SharedItem<folder::Model>>> {
    let grants = incoming_grants(state, user_id, ItemType::Folder).await?;
    let folders = folder::Entity::find()
        .filter(folder::Column::Id.is_in(grants.keys().copied().collect::<Vec<_>>()))
        .filter(folder::Column::DeletedAt.is_null())
        .order_by_asc(folder::Column::Name)
        .all(&state.db)
        .await?;

    Ok(folders
        .into_iter()
        .filter_map(|f| {
            let (permission, shared_by) = *grants.get(&f.id)?;
            Some(SharedItem { item: f, permission, shared_by })
        })
        .collect())
}
