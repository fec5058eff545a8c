//! Department handlers
//!
//! Implements department CRUD operations

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::activity::{action, Subject};
use crate::entity::department::{self, DepartmentResponse};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::hierarchy::{live_department, soft_delete_department};
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

/// Add department request
#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
}

/// Update department request
#[derive(Debug, Deserialize)]
pub struct UpdateDepartmentRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
}

fn clean_code(code: &str) -> AppResult<String> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || code.len() > 16 || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AppError::Validation(
            "department code must be 1 to 16 letters, digits or dashes".to_string(),
        ));
    }
    Ok(code)
}

fn clean_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(AppError::Validation("department name must be 1 to 64 characters".to_string()));
    }
    Ok(name.to_string())
}

fn map_duplicate(e: sea_orm::DbErr, code: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!("department code already exists: {}", code))
    } else {
        e.into()
    }
}

/// GET /api/departments
pub async fn list_departments(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<DepartmentResponse>>>> {
    let list = department::Entity::find()
        .filter(department::Column::DeletedAt.is_null())
        .order_by_asc(department::Column::Name)
        .all(&state.db)
        .await?
        .into_iter()
        .map(DepartmentResponse::from)
        .collect();
    Ok(Json(ApiResponse::success(list)))
}

/// GET /api/departments/:id
pub async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DepartmentResponse>>> {
    let dept = live_department(&state.db, id).await?;
    Ok(Json(ApiResponse::success(dept.into())))
}

/// POST /api/departments
pub async fn create_department(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Json(req): Json<CreateDepartmentRequest>,
) -> AppResult<Json<ApiResponse<DepartmentResponse>>> {
    // Only Super Admins create departments
    if !actor.is_super_admin() {
        return Err(AppError::Forbidden);
    }

    let code = clean_code(&req.code)?;
    let dept = department::ActiveModel {
        name: Set(clean_name(&req.name)?),
        code: Set(code.clone()),
        description: Set(req.description.filter(|d| !d.trim().is_empty())),
        created_at: Set(chrono::Utc::now().timestamp()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| map_duplicate(e, &code))?;

    tracing::info!("Department {} ({}) created", dept.name, dept.code);
    state
        .activity
        .record(Some(actor.id), Subject::department(dept.id), action::CREATED, Some(dept.code.clone()))
        .await;

    Ok(Json(ApiResponse::success(dept.into())))
}

/// PUT /api/departments/:id
pub async fn update_department(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateDepartmentRequest>,
) -> AppResult<Json<ApiResponse<DepartmentResponse>>> {
    if !actor.admin_of(id) {
        return Err(AppError::Forbidden);
    }

    let current = live_department(&state.db, id).await?;
    let old_name = current.name.clone();
    let mut code = current.code.clone();
    let mut active: department::ActiveModel = current.into();

    let mut renamed = false;
    if let Some(name) = req.name.as_deref() {
        let name = clean_name(name)?;
        renamed = name != old_name;
        active.name = Set(name);
    }
    if let Some(new_code) = req.code.as_deref() {
        code = clean_code(new_code)?;
        active.code = Set(code.clone());
    }
    if let Some(description) = req.description {
        active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
    }

    let updated = active.update(&state.db).await.map_err(|e| map_duplicate(e, &code))?;

    let (label, details) = if renamed {
        (action::RENAMED, Some(format!("{} -> {}", old_name, updated.name)))
    } else {
        (action::UPDATED, None)
    };
    state.activity.record(Some(actor.id), Subject::department(id), label, details).await;

    Ok(Json(ApiResponse::success(updated.into())))
}

/// DELETE /api/departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    soft_delete_department(&state, &actor, id).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}
