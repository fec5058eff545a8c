//! User handlers
//!
//! Account administration. Super Admins manage every account; Admins manage
//! accounts of their own department and cannot hand out Super Admin.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::activity::{action, Subject};
use crate::entity::role::{self, RoleKind};
use crate::entity::user::{self, UserResponse, UserStatus};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::handlers::auth::role_names;
use crate::hierarchy::live_department;
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Role name, e.g. "Staff"
    pub role: Option<String>,
    pub department_id: Option<i64>,
}

/// Update user request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub department_id: Option<i64>,
    pub status: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub department_id: Option<i64>,
}

/// Whether the actor may manage accounts in a department (None = unassigned)
fn ensure_manages(actor: &CurrentUser, department_id: Option<i64>) -> AppResult<()> {
    actor.require_admin()?;
    if actor.is_super_admin() {
        return Ok(());
    }
    match department_id {
        Some(id) if actor.admin_of(id) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation(format!("invalid email: {}", email))),
    }
}

/// Resolve a role name, refusing Super Admin for department admins
async fn resolve_role(state: &AppState, actor: &CurrentUser, name: &str) -> AppResult<role::Model> {
    let kind = RoleKind::from_name(name)
        .ok_or_else(|| AppError::Validation(format!("unknown role: {}", name)))?;
    if kind == RoleKind::SuperAdmin && !actor.is_super_admin() {
        return Err(AppError::Forbidden);
    }
    role::Entity::find()
        .filter(role::Column::Name.eq(kind.as_str()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("role {}", kind.as_str())))
}

async fn live_user(state: &AppState, id: i64) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))
}

async fn respond(state: &AppState, model: user::Model) -> AppResult<UserResponse> {
    let roles = role_names(state).await?;
    let role = model.role_id.and_then(|id| roles.get(&id).cloned());
    Ok(UserResponse::from(model).with_role(role))
}

fn map_duplicate(e: sea_orm::DbErr, email: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!("email already registered: {}", email))
    } else {
        e.into()
    }
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ApiResponse<Vec<UserResponse>>>> {
    actor.require_admin()?;

    let department_id = if actor.is_super_admin() {
        query.department_id
    } else {
        // Department admins only see their own department
        Some(actor.department_id.ok_or(AppError::Forbidden)?)
    };

    let mut select = user::Entity::find().filter(user::Column::DeletedAt.is_null());
    if let Some(id) = department_id {
        select = select.filter(user::Column::DepartmentId.eq(id));
    }
    let users = select.order_by_asc(user::Column::Name).all(&state.db).await?;

    let roles = role_names(&state).await?;
    let list = users
        .into_iter()
        .map(|u| {
            let role = u.role_id.and_then(|id| roles.get(&id).cloned());
            UserResponse::from(u).with_role(role)
        })
        .collect();

    Ok(Json(ApiResponse::success(list)))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let model = live_user(&state, id).await?;
    if model.id != actor.id {
        ensure_manages(&actor, model.department_id)?;
    }
    Ok(Json(ApiResponse::success(respond(&state, model).await?)))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    ensure_manages(&actor, req.department_id)?;

    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(AppError::Validation("name must be 1 to 64 characters".to_string()));
    }
    let email = normalize_email(&req.email)?;
    let password = hash_password(&req.password)?;
    if let Some(id) = req.department_id {
        live_department(&state.db, id).await?;
    }
    let role_id = match req.role.as_deref() {
        Some(name) => Some(resolve_role(&state, &actor, name).await?.id),
        None => None,
    };

    let created = user::ActiveModel {
        name: Set(name),
        email: Set(email.clone()),
        password: Set(password),
        role_id: Set(role_id),
        department_id: Set(req.department_id),
        status: Set(UserStatus::Inactive.into()),
        last_login: Set(0),
        created_at: Set(chrono::Utc::now().timestamp()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| map_duplicate(e, &email))?;

    tracing::info!("User {} created by {}", created.email, actor.email);
    state
        .activity
        .record(Some(actor.id), Subject::user(created.id), action::CREATED, Some(created.email.clone()))
        .await;

    Ok(Json(ApiResponse::success(respond(&state, created).await?)))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let current = live_user(&state, id).await?;
    ensure_manages(&actor, current.department_id)?;
    if let Some(department_id) = req.department_id {
        ensure_manages(&actor, Some(department_id))?;
        live_department(&state.db, department_id).await?;
    }

    let mut email = current.email.clone();
    let mut active: user::ActiveModel = current.into();

    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() || name.chars().count() > 64 {
            return Err(AppError::Validation("name must be 1 to 64 characters".to_string()));
        }
        active.name = Set(name.to_string());
    }
    if let Some(new_email) = req.email.as_deref() {
        email = normalize_email(new_email)?;
        active.email = Set(email.clone());
    }
    if let Some(password) = req.password.as_deref() {
        active.password = Set(hash_password(password)?);
    }
    if let Some(role_name) = req.role.as_deref() {
        active.role_id = Set(Some(resolve_role(&state, &actor, role_name).await?.id));
    }
    if let Some(department_id) = req.department_id {
        active.department_id = Set(Some(department_id));
    }
    if let Some(status) = req.status {
        if id == actor.id && UserStatus::from(status) != UserStatus::Active {
            return Err(AppError::BadRequest("cannot deactivate yourself".to_string()));
        }
        active.status = Set(UserStatus::from(status).into());
    }

    let updated = active.update(&state.db).await.map_err(|e| map_duplicate(e, &email))?;

    state
        .activity
        .record(Some(actor.id), Subject::user(id), action::UPDATED, None)
        .await;

    Ok(Json(ApiResponse::success(respond(&state, updated).await?)))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    if id == actor.id {
        return Err(AppError::BadRequest("cannot delete yourself".to_string()));
    }
    let current = live_user(&state, id).await?;
    ensure_manages(&actor, current.department_id)?;

    let email = current.email.clone();
    let mut active: user::ActiveModel = current.into();
    active.deleted_at = Set(Some(chrono::Utc::now().timestamp()));
    active.update(&state.db).await?;

    tracing::info!("User {} deleted by {}", email, actor.email);
    state
        .activity
        .record(Some(actor.id), Subject::user(id), action::DELETED, Some(email))
        .await;

    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/me/password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let current = live_user(&state, actor.id).await?;
    if !bcrypt::verify(&req.old_password, &current.password).unwrap_or(false) {
        return Err(AppError::BadRequest("old password is incorrect".to_string()));
    }

    let mut active: user::ActiveModel = current.into();
    active.password = Set(hash_password(&req.new_password)?);
    active.update(&state.db).await?;

    state
        .activity
        .record(Some(actor.id), Subject::user(actor.id), action::UPDATED, Some("password changed".to_string()))
        .await;

    Ok(Json(ApiResponse::success_msg("success")))
}
