//! In-app notification handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use serde::Deserialize;

use crate::entity::notification;
use crate::error::AppResult;
use crate::middleware::auth::CurrentUser;
use crate::notify::store;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

/// GET /api/notifications?unread=true
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<ApiResponse<Vec<notification::Model>>>> {
    let list = store::list_for_user(&state.db, user.id, query.unread).await?;
    Ok(Json(ApiResponse::success(list)))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<notification::Model>>> {
    let model = store::mark_read(&state.db, user.id, id).await?;
    Ok(Json(ApiResponse::success(model)))
}
