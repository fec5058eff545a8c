//! Notification entity - in-app notices
//!
//! Table: fildas_notification

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_notification")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Recipient
    pub user_id: i64,

    /// share | document_change
    #[sea_orm(column_type = "String(Some(32))")]
    pub kind: String,

    #[sea_orm(column_type = "String(Some(16))")]
    pub item_type: String,

    pub item_id: i64,

    #[sea_orm(column_type = "String(Some(255))")]
    pub item_name: String,

    #[sea_orm(column_type = "String(Some(16))", nullable)]
    pub permission: Option<String>,

    /// Encoded change label, e.g. "rejected_with_reason:missing totals"
    #[sea_orm(column_type = "Text", nullable)]
    pub change_type: Option<String>,

    #[sea_orm(column_type = "String(Some(64))")]
    pub actor_name: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(nullable)]
    pub read_at: Option<i64>,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
