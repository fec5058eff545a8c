//! Share entity - per-item permission grants
//!
//! Table: fildas_share
//!
//! Exactly one of document_id / folder_id is set. One row per
//! (owner, target, item), enforced by partial unique indexes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_share")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub owner_id: i64,

    pub target_user_id: i64,

    #[sea_orm(nullable)]
    pub document_id: Option<i64>,

    #[sea_orm(nullable)]
    pub folder_id: Option<i64>,

    /// viewer | contributor | editor
    #[sea_orm(column_type = "String(Some(16))")]
    pub permission: String,

    pub created_at: i64,

    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Share response with the item flattened to type + id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShareResponse {
    pub id: i64,
    pub owner_id: i64,
    pub target_user_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub permission: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Model> for ShareResponse {
    fn from(model: Model) -> Self {
        let (item_type, item_id) = match (model.document_id, model.folder_id) {
            (Some(id), _) => ("document", id),
            (None, Some(id)) => ("folder", id),
            (None, None) => ("document", 0),
        };
        Self {
            id: model.id,
            owner_id: model.owner_id,
            target_user_id: model.target_user_id,
            item_type: item_type.to_string(),
            item_id,
            permission: model.permission,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
