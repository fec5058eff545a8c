//! Activity entity - append-only audit trail
//!
//! Table: fildas_activity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_activity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// None for system actions
    #[sea_orm(nullable)]
    pub actor_id: Option<i64>,

    /// user | department | folder | document | document_version | share
    #[sea_orm(column_type = "String(Some(32))")]
    pub subject_type: String,

    pub subject_id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub action: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
