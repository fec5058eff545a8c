//! Configuration handlers
//!
//! Returns public configuration settings to the frontend

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::routes::ApiResponse;
use crate::state::AppState;

/// Public configuration response
#[derive(Debug, Serialize)]
pub struct PublicConfig {
    /// Maximum upload file size in bytes
    #[serde(rename = "maxUploadSize")]
    pub max_upload_size: usize,
    /// Whether office files get a PDF preview
    #[serde(rename = "previewEnabled")]
    pub preview_enabled: bool,
    /// Active notification channels
    #[serde(rename = "notificationSinks")]
    pub notification_sinks: Vec<&'static str>,
}

/// GET /api/config
/// Returns public configuration settings
pub async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<PublicConfig>> {
    Json(ApiResponse::success(PublicConfig {
        max_upload_size: state.config.max_upload_size,
        preview_enabled: state.converter.is_some(),
        notification_sinks: state.notifier.sink_names(),
    }))
}
