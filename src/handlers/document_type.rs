//! Document type handlers

use axum::{extract::State, response::Json, Extension};
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::Deserialize;

use crate::entity::document_type;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDocumentTypeRequest {
    pub name: String,
    pub description: Option<String>,
}

/// GET /api/document-types
pub async fn list_document_types(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<document_type::Model>>>> {
    let list = document_type::Entity::find()
        .order_by_asc(document_type::Column::Name)
        .all(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

/// POST /api/document-types
pub async fn create_document_type(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Json(req): Json<CreateDocumentTypeRequest>,
) -> AppResult<Json<ApiResponse<document_type::Model>>> {
    actor.require_admin()?;

    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(AppError::Validation("type name must be 1 to 64 characters".to_string()));
    }

    let created = document_type::ActiveModel {
        name: Set(name.clone()),
        description: Set(req.description.filter(|d| !d.trim().is_empty())),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("document type already exists: {}", name))
        } else {
            e.into()
        }
    })?;

    tracing::info!("Document type '{}' created by {}", created.name, actor.email);
    Ok(Json(ApiResponse::success(created)))
}
