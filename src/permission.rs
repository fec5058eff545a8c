//! Permission resolution
//!
//! Effective access to a folder or document is the highest of:
//! ownership (editor), admin override (editor), a share on the item,
//! a share on any ancestor folder, and department membership (viewer).

use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entity::{document, folder, share};
use crate::error::{AppError, AppResult};
use crate::hierarchy::folder_ancestors;
use crate::middleware::CurrentUser;

/// Share permission level, ordered viewer < contributor < editor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Viewer,
    Contributor,
    Editor,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Viewer => "viewer",
            Permission::Contributor => "contributor",
            Permission::Editor => "editor",
        }
    }

    /// Capitalized form used in messages
    pub fn label(&self) -> &'static str {
        match self {
            Permission::Viewer => "Viewer",
            Permission::Contributor => "Contributor",
            Permission::Editor => "Editor",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Permission::Viewer),
            "contributor" => Ok(Permission::Contributor),
            "editor" => Ok(Permission::Editor),
            other => Err(AppError::Validation(format!("unknown permission: {}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Document,
    Folder,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Document => "document",
            ItemType::Folder => "folder",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" | "documents" => Ok(ItemType::Document),
            "folder" | "folders" => Ok(ItemType::Folder),
            other => Err(AppError::BadRequest(format!("unknown item type: {}", other))),
        }
    }
}

/// A shareable item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Document(i64),
    Folder(i64),
}

impl ItemRef {
    pub fn new(item_type: ItemType, id: i64) -> Self {
        match item_type {
            ItemType::Document => ItemRef::Document(id),
            ItemType::Folder => ItemRef::Folder(id),
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            ItemRef::Document(_) => ItemType::Document,
            ItemRef::Folder(_) => ItemType::Folder,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ItemRef::Document(id) | ItemRef::Folder(id) => *id,
        }
    }
}

/// The access-relevant facts about a live item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemInfo {
    pub item: ItemRef,
    pub name: String,
    pub owner_id: i64,
    pub department_id: i64,
    /// Containing folder for a document, parent for a folder
    pub parent_folder: Option<i64>,
}

impl From<&document::Model> for ItemInfo {
    fn from(doc: &document::Model) -> Self {
        Self {
            item: ItemRef::Document(doc.id),
            name: doc.title.clone(),
            owner_id: doc.owner_id,
            department_id: doc.department_id,
            parent_folder: doc.folder_id,
        }
    }
}

impl From<&folder::Model> for ItemInfo {
    fn from(f: &folder::Model) -> Self {
        Self {
            item: ItemRef::Folder(f.id),
            name: f.name.clone(),
            owner_id: f.owner_id,
            department_id: f.department_id,
            parent_folder: f.parent_id,
        }
    }
}

/// Load a live item; soft-deleted items are not found
pub async fn load_item<C: ConnectionTrait>(db: &C, item: ItemRef) -> AppResult<ItemInfo> {
    match item {
        ItemRef::Document(id) => document::Entity::find_by_id(id)
            .one(db)
            .await?
            .filter(|d| !d.is_deleted())
            .map(|d| ItemInfo::from(&d))
            .ok_or(AppError::DocumentNotFound(id)),
        ItemRef::Folder(id) => folder::Entity::find_by_id(id)
            .one(db)
            .await?
            .filter(|f| !f.is_deleted())
            .map(|f| ItemInfo::from(&f))
            .ok_or_else(|| AppError::NotFound(format!("folder {}", id))),
    }
}

/// Load an item whether or not it is soft-deleted; the flag is true when deleted
pub async fn load_item_with_deleted<C: ConnectionTrait>(db: &C, item: ItemRef) -> AppResult<(ItemInfo, bool)> {
    match item {
        ItemRef::Document(id) => document::Entity::find_by_id(id)
            .one(db)
            .await?
            .map(|d| (ItemInfo::from(&d), d.is_deleted()))
            .ok_or(AppError::DocumentNotFound(id)),
        ItemRef::Folder(id) => folder::Entity::find_by_id(id)
            .one(db)
            .await?
            .map(|f| (ItemInfo::from(&f), f.is_deleted()))
            .ok_or_else(|| AppError::NotFound(format!("folder {}", id))),
    }
}

/// Highest permission the actor holds on the item, None when there is no access
pub async fn resolve_access<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    item: &ItemInfo,
) -> AppResult<Option<Permission>> {
    if item.owner_id == actor.id || actor.admin_of(item.department_id) {
        return Ok(Some(Permission::Editor));
    }

    let mut best = actor
        .member_of(item.department_id)
        .then_some(Permission::Viewer);

    // Folders whose shares apply: the item itself (if a folder) and every ancestor
    let chain_start = match item.item {
        ItemRef::Folder(id) => Some(id),
        ItemRef::Document(_) => item.parent_folder,
    };
    let chain = match chain_start {
        Some(id) => folder_ancestors(db, id).await?,
        None => Vec::new(),
    };

    let mut on_item = Condition::any();
    if let ItemRef::Document(id) = item.item {
        on_item = on_item.add(share::Column::DocumentId.eq(id));
    }
    if !chain.is_empty() {
        on_item = on_item.add(share::Column::FolderId.is_in(chain));
    }
    if on_item.is_empty() {
        return Ok(best);
    }

    let shares = share::Entity::find()
        .filter(share::Column::TargetUserId.eq(actor.id))
        .filter(on_item)
        .all(db)
        .await?;

    for grant in shares {
        match grant.permission.parse::<Permission>() {
            Ok(p) => best = best.max(Some(p)),
            Err(_) => tracing::warn!("Ignoring share {} with bad permission {}", grant.id, grant.permission),
        }
    }

    Ok(best)
}

/// Whether a resolved permission allows modifying an item.
///
/// Contributor only writes to items it owns; viewer never writes.
pub fn can_modify(permission: Option<Permission>, owner_id: i64, user_id: i64, is_admin: bool) -> bool {
    if is_admin {
        return true;
    }
    match permission {
        Some(Permission::Editor) => true,
        Some(Permission::Contributor) => owner_id == user_id,
        Some(Permission::Viewer) | None => false,
    }
}

/// Load an item the actor may read
pub async fn require_read<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    item: ItemRef,
) -> AppResult<(ItemInfo, Permission)> {
    let info = load_item(db, item).await?;
    match resolve_access(db, actor, &info).await? {
        Some(permission) => Ok((info, permission)),
        None => Err(AppError::Forbidden),
    }
}

/// Load an item the actor may modify
pub async fn require_modify<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    item: ItemRef,
) -> AppResult<ItemInfo> {
    let info = load_item(db, item).await?;
    let permission = resolve_access(db, actor, &info).await?;
    if can_modify(permission, info.owner_id, actor.id, actor.admin_of(info.department_id)) {
        Ok(info)
    } else {
        Err(AppError::Forbidden)
    }
}
