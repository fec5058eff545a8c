//! Document handlers
//!
//! Multipart upload, metadata, content streaming, versions and the review
//! workflow. `stream` and `preview` are public so inline viewers can fetch
//! them without headers.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Json, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::io::ReaderStream;

use crate::entity::document::{self, DocumentResponse};
use crate::entity::document_version;
use crate::error::{AppError, AppResult};
use crate::hierarchy::{self, DocumentFilter, DocumentStatistics, DocumentUpdate, NewDocument};
use crate::middleware::auth::CurrentUser;
use crate::permission::Permission;
use crate::routes::ApiResponse;
use crate::sharing::{self, SharedItem};
use crate::state::AppState;
use crate::storage::{is_safe_filename, StoredFile, DOCUMENTS};
use crate::versioning;

#[derive(Debug, Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: DocumentResponse,
    /// The caller's effective permission
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct ReplaceResponse {
    pub document: DocumentResponse,
    pub version: document_version::Model,
}

#[derive(Debug, Deserialize)]
pub struct MoveDocumentRequest {
    /// Target folder; absent or null moves to the department root
    pub folder_id: Option<i64>,
    #[serde(default)]
    pub allow_cross_department: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// Text fields plus at most one stored file from a multipart body
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<StoredFile>,
}

impl UploadForm {
    async fn discard(&mut self, state: &AppState) {
        if let Some(file) = self.file.take() {
            state.store.discard(&file.relative_path).await;
        }
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    fn id(&self, name: &str) -> AppResult<Option<i64>> {
        self.text(name)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| AppError::BadRequest(format!("{} must be an integer", name)))
            })
            .transpose()
    }
}

/// Stream the `file` part to the store while collecting the text parts
async fn read_upload(state: &AppState, mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                form.discard(state).await;
                return Err(AppError::BadRequest(format!("invalid multipart body: {}", e)));
            }
        };
        let name = field.name().unwrap_or("").to_string();
        tracing::debug!("Parsing field: {}", name);

        if name == "file" {
            if form.file.is_some() {
                form.discard(state).await;
                return Err(AppError::BadRequest("only one file per upload".to_string()));
            }
            let file_name = field.file_name().unwrap_or("").to_string();
            if !is_safe_filename(&file_name) {
                form.discard(state).await;
                return Err(AppError::BadRequest("invalid file name".to_string()));
            }
            let content_type = field.content_type().map(str::to_string);
            match state
                .store
                .save_stream(DOCUMENTS, &file_name, content_type.as_deref(), field)
                .await
            {
                Ok(stored) => form.file = Some(stored),
                Err(e) => {
                    form.discard(state).await;
                    return Err(e);
                }
            }
        } else {
            match field.text().await {
                Ok(text) => {
                    form.fields.insert(name, text);
                }
                Err(e) => {
                    form.discard(state).await;
                    return Err(AppError::BadRequest(format!("invalid field {}: {}", name, e)));
                }
            }
        }
    }

    Ok(form)
}

/// Department (defaulting to the uploader's), folder and type ids of an upload
fn upload_target(form: &UploadForm, user: &CurrentUser) -> AppResult<(i64, Option<i64>, Option<i64>)> {
    let department_id = form
        .id("department_id")?
        .or(user.department_id)
        .ok_or_else(|| AppError::BadRequest("department_id is required".to_string()))?;
    Ok((department_id, form.id("folder_id")?, form.id("document_type_id")?))
}

/// GET /api/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<DocumentFilter>,
) -> AppResult<Json<ApiResponse<Vec<DocumentResponse>>>> {
    let list = hierarchy::list_documents(&state, &user, filter)
        .await?
        .into_iter()
        .map(DocumentResponse::from)
        .collect();
    Ok(Json(ApiResponse::success(list)))
}

/// POST /api/documents (multipart: file, title, description, department_id,
/// folder_id, document_type_id)
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let mut form = read_upload(&state, multipart).await?;

    let (department_id, folder_id, document_type_id) = match upload_target(&form, &user) {
        Ok(values) => values,
        Err(e) => {
            form.discard(&state).await;
            return Err(e);
        }
    };

    let Some(stored) = form.file.take() else {
        return Err(AppError::BadRequest("missing file".to_string()));
    };

    let new = NewDocument {
        title: form
            .text("title")
            .map(str::to_string)
            .unwrap_or_else(|| stored.original_name.clone()),
        description: form.text("description").map(str::to_string),
        department_id,
        folder_id,
        document_type_id,
    };

    let doc = hierarchy::create_document(&state, &user, new, &stored).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// GET /api/documents/shared
pub async fn shared_documents(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<SharedItem<DocumentResponse>>>>> {
    let list = sharing::shared_documents(&state, user.id)
        .await?
        .into_iter()
        .map(|s| SharedItem {
            item: DocumentResponse::from(s.item),
            permission: s.permission,
            shared_by: s.shared_by,
        })
        .collect();
    Ok(Json(ApiResponse::success(list)))
}

/// GET /api/documents/statistics/summary
pub async fn statistics_summary(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<DocumentStatistics>>> {
    let stats = hierarchy::document_statistics(&state, &user).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// GET /api/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DocumentDetail>>> {
    let (doc, permission) = hierarchy::get_document(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(DocumentDetail {
        document: doc.into(),
        permission,
    })))
}

/// PUT /api/documents/:id
pub async fn update_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<DocumentUpdate>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let doc = hierarchy::update_document(&state, &user, id, req).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// DELETE /api/documents/:id
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    hierarchy::soft_delete_document(&state, &user, id).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// Build a streaming file response
async fn file_response(
    state: &AppState,
    relative: &str,
    mime_type: &str,
    disposition: &str,
    file_name: &str,
) -> AppResult<Response> {
    let (file, len) = state.store.open(relative).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    // Keep the header ASCII; quotes and control characters would break it
    let safe_name: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() && c != '"' { c } else { '_' })
        .collect();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("{}; filename=\"{}\"", disposition, safe_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build response: {}", e)))
}

/// GET /api/documents/:id/download
pub async fn download_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let (doc, _) = hierarchy::get_document(&state, &user, id).await?;
    file_response(&state, &doc.file_path, &doc.mime_type, "attachment", &doc.original_name).await
}

async fn public_document(state: &AppState, id: i64) -> AppResult<document::Model> {
    hierarchy::live_document(&state.db, id).await
}

/// GET /api/documents/:id/stream (public)
pub async fn stream_document(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Response> {
    let doc = public_document(&state, id).await?;
    file_response(&state, &doc.file_path, &doc.mime_type, "inline", &doc.original_name).await
}

/// GET /api/documents/:id/preview (public)
pub async fn preview_document(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Response> {
    let doc = public_document(&state, id).await?;
    let Some(preview) = doc.preview_path.as_deref() else {
        return Err(AppError::NotFound(format!("preview for document {}", id)));
    };
    let name = crate::storage::preview_path_for(&doc.original_name);
    file_response(&state, preview, "application/pdf", "inline", &name).await
}

/// POST /api/documents/:id/preview/regenerate
pub async fn regenerate_preview(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let doc = versioning::regenerate_preview(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// POST /api/documents/:id/content (multipart: file)
pub async fn replace_content(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<ReplaceResponse>>> {
    let mut form = read_upload(&state, multipart).await?;
    let Some(stored) = form.file.take() else {
        return Err(AppError::BadRequest("missing file".to_string()));
    };

    let (doc, version) = versioning::replace_content(&state, &user, id, &stored).await?;
    Ok(Json(ApiResponse::success(ReplaceResponse {
        document: doc.into(),
        version,
    })))
}

/// GET /api/documents/:id/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<document_version::Model>>>> {
    let versions = versioning::list_versions(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(versions)))
}

/// POST /api/documents/:id/move
pub async fn move_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<MoveDocumentRequest>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let doc = hierarchy::move_document(&state, &user, id, req.folder_id, req.allow_cross_department).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// POST /api/documents/:id/restore
pub async fn restore_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let doc = hierarchy::restore_document(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// POST /api/documents/:id/submit
pub async fn submit_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let doc = hierarchy::submit_for_review(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// POST /api/documents/:id/approve
pub async fn approve_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let doc = hierarchy::approve(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}

/// POST /api/documents/:id/reject
pub async fn reject_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<ApiResponse<DocumentResponse>>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let doc = hierarchy::reject(&state, &user, id, req.reason.as_deref()).await?;
    Ok(Json(ApiResponse::success(doc.into())))
}
