//! Authentication handlers
//!
//! Implements login and current user endpoints

use axum::{extract::State, response::Json, Extension};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::activity::{action, Subject};
use crate::entity::user::{self, UserStatus};
use crate::entity::{department, role};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{issue_token, CurrentUser};
use crate::routes::ApiResponse;
use crate::state::AppState;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: MeResponse,
}

/// Current user response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
}

impl MeResponse {
    async fn build(state: &AppState, user: &CurrentUser) -> AppResult<Self> {
        let department_name = match user.department_id {
            Some(id) => department::Entity::find_by_id(id)
                .one(&state.db)
                .await?
                .map(|d| d.name),
            None => None,
        };
        Ok(Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.map(|r| r.as_str().to_string()),
            department_id: user.department_id,
            department_name,
        })
    }
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("email and password are required".to_string()));
    }

    let db_user = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .filter(user::Column::DeletedAt.is_null())
        .one(&state.db)
        .await?;

    let Some(db_user) = db_user else {
        tracing::warn!("Login failed: unknown email - {}", email);
        return Err(AppError::Unauthorized);
    };

    // Verify password using bcrypt
    if !bcrypt::verify(&req.password, &db_user.password).unwrap_or(false) {
        tracing::warn!("Login failed: wrong password - {}", email);
        return Err(AppError::Unauthorized);
    }

    if UserStatus::from(db_user.status) == UserStatus::Disabled {
        tracing::warn!("Login failed: user disabled - {}", email);
        return Err(AppError::Forbidden);
    }
    if db_user.role_id.is_none() {
        tracing::warn!("Login failed: no role assigned - {}", email);
        return Err(AppError::Forbidden);
    }

    // First login activates the account
    let user_id = db_user.id;
    let mut active_model: user::ActiveModel = db_user.into();
    active_model.last_login = Set(chrono::Utc::now().timestamp());
    active_model.status = Set(UserStatus::Active.into());
    active_model.update(&state.db).await?;

    let current = CurrentUser::load(&state.db, user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let token = issue_token(&state.config.auth, user_id)?;

    tracing::info!("User logged in: {}", email);
    state
        .activity
        .record(Some(user_id), Subject::user(user_id), action::LOGIN, None)
        .await;

    Ok(Json(ApiResponse::success(LoginResponse {
        token,
        expires_in: state.config.auth.token_ttl_hours * 3600,
        user: MeResponse::build(&state, &current).await?,
    })))
}

/// GET /api/me
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    Ok(Json(ApiResponse::success(MeResponse::build(&state, &user).await?)))
}

/// Role names keyed by id, for responses
pub(crate) async fn role_names(state: &AppState) -> AppResult<std::collections::HashMap<i64, String>> {
    Ok(role::Entity::find()
        .all(&state.db)
        .await?
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect())
}
