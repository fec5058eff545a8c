//! Share handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};

use crate::entity::share::ShareResponse;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::permission::{ItemRef, ItemType, Permission};
use crate::routes::ApiResponse;
use crate::sharing::{self, GrantOutcome, ShareView};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ShareQuery {
    /// "incoming" (default) or "outgoing"
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub target_user_id: i64,
    pub item_type: ItemType,
    pub item_id: i64,
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub share: ShareResponse,
    pub outcome: GrantOutcome,
}

/// GET /api/shares?direction=incoming|outgoing
pub async fn list_shares(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ShareQuery>,
) -> AppResult<Json<ApiResponse<Vec<ShareView>>>> {
    let list = match query.direction.as_deref().unwrap_or("incoming") {
        "incoming" => sharing::incoming(&state, user.id).await?,
        "outgoing" => sharing::outgoing(&state, user.id).await?,
        other => return Err(AppError::BadRequest(format!("unknown direction: {}", other))),
    };
    Ok(Json(ApiResponse::success(list)))
}

/// POST /api/shares
pub async fn grant_share(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<GrantRequest>,
) -> AppResult<Json<ApiResponse<GrantResponse>>> {
    let item = ItemRef::new(req.item_type, req.item_id);
    let (share, outcome) = sharing::grant(&state, &user, req.target_user_id, item, req.permission).await?;
    Ok(Json(ApiResponse::success(GrantResponse {
        share: share.into(),
        outcome,
    })))
}

/// DELETE /api/shares/:id
pub async fn revoke_share(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    sharing::revoke(&state, &user, id).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/items/:item_type/:id/shares
pub async fn item_shares(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((item_type, id)): Path<(String, i64)>,
) -> AppResult<Json<ApiResponse<Vec<ShareView>>>> {
    let item = ItemRef::new(item_type.parse()?, id);
    let list = sharing::item_shares(&state, &user, item).await?;
    Ok(Json(ApiResponse::success(list)))
}
