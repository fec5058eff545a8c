//! Folder entity - department-scoped folder tree
//!
//! Table: fildas_folder
//!
//! The tree is an id arena: each row points at its parent by id and the
//! hierarchy module walks those ids. A parent always lives in the same
//! department as its child.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_folder")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(255))")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Parent folder (None = department root)
    #[sea_orm(nullable)]
    pub parent_id: Option<i64>,

    pub department_id: i64,

    pub owner_id: i64,

    pub created_at: i64,

    pub updated_at: i64,

    #[sea_orm(nullable)]
    pub deleted_at: Option<i64>,

    /// Id shared by every row one folder delete cascaded to
    #[sea_orm(nullable)]
    pub deleted_batch: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Self-reference is resolved through parent_id lookups

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Folder response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub department_id: i64,
    pub owner_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Model> for FolderResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            parent_id: model.parent_id,
            department_id: model.department_id,
            owner_id: model.owner_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
