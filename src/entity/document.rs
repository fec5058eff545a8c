//! Document entity - archived files
//!
//! Table: fildas_document

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review state of a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::PendingReview => "pending_review",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }

    /// A document can go (back) to review from draft or after a rejection
    pub fn can_submit(&self) -> bool {
        matches!(self, DocumentStatus::Draft | DocumentStatus::Rejected)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DocumentStatus::Draft),
            "pending_review" => Ok(DocumentStatus::PendingReview),
            "approved" => Ok(DocumentStatus::Approved),
            "rejected" => Ok(DocumentStatus::Rejected),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_document")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(255))")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Path relative to the storage root
    #[sea_orm(column_type = "String(Some(512))")]
    pub file_path: String,

    /// PDF rendition, relative to the storage root
    #[sea_orm(column_type = "String(Some(512))", nullable)]
    pub preview_path: Option<String>,

    #[sea_orm(column_type = "String(Some(255))")]
    pub original_name: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub mime_type: String,

    pub size: i64,

    pub department_id: i64,

    #[sea_orm(nullable)]
    pub document_type_id: Option<i64>,

    /// Containing folder (None = department root)
    #[sea_orm(nullable)]
    pub folder_id: Option<i64>,

    pub uploaded_by: i64,

    pub owner_id: i64,

    #[sea_orm(column_type = "String(Some(32))")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,

    pub uploaded_at: i64,

    pub updated_at: i64,

    #[sea_orm(nullable)]
    pub deleted_at: Option<i64>,

    /// Id shared by every row one folder delete cascaded to
    #[sea_orm(nullable)]
    pub deleted_batch: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Unknown values read as draft
    pub fn status(&self) -> DocumentStatus {
        self.status.parse().unwrap_or(DocumentStatus::Draft)
    }

    pub fn size_human(&self) -> String {
        format_size(self.size)
    }
}

/// Human readable size: 1536 -> "1.5 KB", 2097152 -> "2 MB"
pub fn format_size(size: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Document response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub size_human: String,
    pub has_preview: bool,
    pub department_id: i64,
    pub document_type_id: Option<i64>,
    pub folder_id: Option<i64>,
    pub uploaded_by: i64,
    pub owner_id: i64,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub uploaded_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl From<Model> for DocumentResponse {
    fn from(model: Model) -> Self {
        Self {
            size_human: format_size(model.size),
            has_preview: model.preview_path.is_some(),
            id: model.id,
            title: model.title,
            description: model.description,
            original_name: model.original_name,
            mime_type: model.mime_type,
            size: model.size,
            department_id: model.department_id,
            document_type_id: model.document_type_id,
            folder_id: model.folder_id,
            uploaded_by: model.uploaded_by,
            owner_id: model.owner_id,
            status: model.status,
            rejection_reason: model.rejection_reason,
            uploaded_at: model.uploaded_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1024), "1024 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(format_size(1_234_567), "1.18 MB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn test_status_round_trip_and_transitions() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::PendingReview,
            DocumentStatus::Approved,
            DocumentStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>(), Ok(status));
        }
        assert!(DocumentStatus::Draft.can_submit());
        assert!(DocumentStatus::Rejected.can_submit());
        assert!(!DocumentStatus::PendingReview.can_submit());
        assert!(!DocumentStatus::Approved.can_submit());
    }
}
