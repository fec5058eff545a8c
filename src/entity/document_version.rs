//! DocumentVersion entity - immutable content snapshots
//!
//! Table: fildas_document_version
//!
//! (document_id, version_number) is unique, enforced by an index created in
//! `db::ensure_indexes`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_document_version")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub document_id: i64,

    /// Starts at 1
    pub version_number: i32,

    #[sea_orm(column_type = "String(Some(512))")]
    #[serde(skip_serializing)]
    pub file_path: String,

    #[sea_orm(column_type = "String(Some(255))")]
    pub original_name: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub mime_type: String,

    pub size: i64,

    /// sha-256, hex
    #[sea_orm(column_type = "String(Some(64))")]
    pub checksum: String,

    pub uploaded_by: i64,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
