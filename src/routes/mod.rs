use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Multipart routes get the configured limit instead of axum's 2MB default
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_size);

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/login", post(handlers::auth::login))
        .route("/me", get(handlers::auth::me))
        .route("/me/password", post(handlers::user::change_password))
        // Config routes
        .route("/config", get(handlers::config::get_config))
        // User routes
        .route(
            "/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route(
            "/users/:id",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        )
        // Department routes
        .route(
            "/departments",
            get(handlers::department::list_departments).post(handlers::department::create_department),
        )
        .route(
            "/departments/:id",
            get(handlers::department::get_department)
                .put(handlers::department::update_department)
                .delete(handlers::department::delete_department),
        )
        // Document type routes
        .route(
            "/document-types",
            get(handlers::document_type::list_document_types)
                .post(handlers::document_type::create_document_type),
        )
        // Folder routes
        .route(
            "/folders",
            get(handlers::folder::list_children).post(handlers::folder::create_folder),
        )
        .route("/folders/shared", get(handlers::folder::shared_folders))
        .route(
            "/folders/:id",
            get(handlers::folder::get_folder)
                .put(handlers::folder::update_folder)
                .delete(handlers::folder::delete_folder),
        )
        .route("/folders/:id/move", post(handlers::folder::move_folder))
        .route("/folders/:id/restore", post(handlers::folder::restore_folder))
        // Document routes
        .route(
            "/documents",
            get(handlers::document::list_documents)
                .post(handlers::document::upload_document)
                .layer(upload_limit.clone()),
        )
        .route("/documents/shared", get(handlers::document::shared_documents))
        .route(
            "/documents/statistics/summary",
            get(handlers::document::statistics_summary),
        )
        .route(
            "/documents/:id",
            get(handlers::document::get_document)
                .put(handlers::document::update_document)
                .delete(handlers::document::delete_document),
        )
        .route("/documents/:id/download", get(handlers::document::download_document))
        .route("/documents/:id/stream", get(handlers::document::stream_document))
        .route("/documents/:id/preview", get(handlers::document::preview_document))
        .route(
            "/documents/:id/preview/regenerate",
            post(handlers::document::regenerate_preview),
        )
        .route(
            "/documents/:id/content",
            post(handlers::document::replace_content).layer(upload_limit),
        )
        .route("/documents/:id/versions", get(handlers::document::list_versions))
        .route("/documents/:id/move", post(handlers::document::move_document))
        .route("/documents/:id/restore", post(handlers::document::restore_document))
        .route("/documents/:id/submit", post(handlers::document::submit_document))
        .route("/documents/:id/approve", post(handlers::document::approve_document))
        .route("/documents/:id/reject", post(handlers::document::reject_document))
        // Share routes
        .route(
            "/shares",
            get(handlers::share::list_shares).post(handlers::share::grant_share),
        )
        .route("/shares/:id", delete(handlers::share::revoke_share))
        .route("/items/:item_type/:id/shares", get(handlers::share::item_shares))
        // Activity routes
        .route("/activities", get(handlers::activity::list_activities))
        .route("/activities/mine", get(handlers::activity::my_activities))
        // Notification routes
        .route("/notifications", get(handlers::notification::list_notifications))
        .route("/notifications/:id/read", post(handlers::notification::mark_read));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> AppError {
    AppError::NotFound("route".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::role::RoleKind;
    use crate::test_util::{seed_department, seed_user, TestApp};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new().await;
        let response = create_router(app.state.clone())
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["code"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = TestApp::new().await;
        let response = create_router(app.state.clone())
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn login_then_me() {
        let app = TestApp::new().await;
        let dept = seed_department(&app.state.db, "Finance", "FIN").await;
        seed_user(&app.state.db, "Dana", Some(dept.id), RoleKind::Staff).await;
        let router = create_router(app.state.clone());

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/login",
                None,
                serde_json::json!({"email": "DANA@example.org", "password": "password"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["data"]["token"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["user"]["department_name"], "Finance");

        let response = router
            .oneshot(
                Request::get("/api/me")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["email"], "dana@example.org");
        assert_eq!(body["data"]["role"], "Staff");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = TestApp::new().await;
        seed_user(&app.state.db, "Eli", None, RoleKind::Staff).await;
        let response = create_router(app.state.clone())
            .oneshot(json_request(
                "POST",
                "/api/login",
                None,
                serde_json::json!({"email": "eli@example.org", "password": "nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn folder_routes_round_trip() {
        let app = TestApp::new().await;
        let dept = seed_department(&app.state.db, "Finance", "FIN").await;
        let user = seed_user(&app.state.db, "Fay", Some(dept.id), RoleKind::Staff).await;
        let token = crate::middleware::auth::issue_token(&app.state.config.auth, user.id).unwrap();
        let router = create_router(app.state.clone());

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/folders",
                Some(&token),
                serde_json::json!({"name": "Reports", "department_id": dept.id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(response).await["data"]["id"].as_i64().unwrap();

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/folders/{}/move", id),
                Some(&token),
                serde_json::json!({"parent_id": id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["kind"], "cycle_detected");

        let response = router
            .oneshot(
                Request::get(format!("/api/folders?department_id={}", dept.id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["folders"][0]["name"], "Reports");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = TestApp::new().await;
        let response = create_router(app.state.clone())
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
