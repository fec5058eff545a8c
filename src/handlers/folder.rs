//! Folder handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};

use crate::entity::document::DocumentResponse;
use crate::entity::folder::FolderResponse;
use crate::error::AppResult;
use crate::hierarchy::{self, FolderUpdate, NewFolder};
use crate::middleware::auth::CurrentUser;
use crate::permission::Permission;
use crate::routes::ApiResponse;
use crate::sharing::{self, SharedItem};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    pub department_id: i64,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChildrenResponse {
    pub folders: Vec<FolderResponse>,
    pub documents: Vec<DocumentResponse>,
}

#[derive(Debug, Serialize)]
pub struct FolderDetail {
    #[serde(flatten)]
    pub folder: FolderResponse,
    /// The caller's effective permission
    pub permission: Permission,
    /// Ids from the department root down to this folder
    pub path: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    /// Target parent; absent or null moves to the department root
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub allow_cross_department: bool,
}

/// GET /api/folders?department_id=&parent_id=
pub async fn list_children(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ChildrenQuery>,
) -> AppResult<Json<ApiResponse<ChildrenResponse>>> {
    let children = hierarchy::list_children(&state, &user, query.department_id, query.parent_id).await?;
    Ok(Json(ApiResponse::success(ChildrenResponse {
        folders: children.folders.into_iter().map(FolderResponse::from).collect(),
        documents: children.documents.into_iter().map(DocumentResponse::from).collect(),
    })))
}

/// POST /api/folders
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<NewFolder>,
) -> AppResult<Json<ApiResponse<FolderResponse>>> {
    let folder = hierarchy::create_folder(&state, &user, req).await?;
    Ok(Json(ApiResponse::success(folder.into())))
}

/// GET /api/folders/shared
pub async fn shared_folders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<SharedItem<FolderResponse>>>>> {
    let list = sharing::shared_folders(&state, user.id)
        .await?
        .into_iter()
        .map(|s| SharedItem {
            item: FolderResponse::from(s.item),
            permission: s.permission,
            shared_by: s.shared_by,
        })
        .collect();
    Ok(Json(ApiResponse::success(list)))
}

/// GET /api/folders/:id
pub async fn get_folder(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<FolderDetail>>> {
    let (folder, permission) = hierarchy::get_folder(&state, &user, id).await?;
    let mut path = hierarchy::folder_ancestors(&state.db, id).await?;
    path.reverse();
    Ok(Json(ApiResponse::success(FolderDetail {
        folder: folder.into(),
        permission,
        path,
    })))
}

/// PUT /api/folders/:id
pub async fn update_folder(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<FolderUpdate>,
) -> AppResult<Json<ApiResponse<FolderResponse>>> {
    let folder = hierarchy::update_folder(&state, &user, id, req).await?;
    Ok(Json(ApiResponse::success(folder.into())))
}

/// DELETE /api/folders/:id
pub async fn delete_folder(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    hierarchy::soft_delete_folder(&state, &user, id).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/folders/:id/move
pub async fn move_folder(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<MoveRequest>,
) -> AppResult<Json<ApiResponse<FolderResponse>>> {
    let folder = hierarchy::move_folder(&state, &user, id, req.parent_id, req.allow_cross_department).await?;
    Ok(Json(ApiResponse::success(folder.into())))
}

/// POST /api/folders/:id/restore
pub async fn restore_folder(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<FolderResponse>>> {
    let folder = hierarchy::restore_folder(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(folder.into())))
}
