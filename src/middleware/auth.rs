//! Authentication middleware
//!
//! Bearer-token authentication for API routes. A valid token resolves to a
//! live, active user which is inserted into the request as `CurrentUser`.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::entity::role::{self, RoleKind};
use crate::entity::user::{self, UserStatus};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Expiry, unix seconds
    pub exp: i64,
}

pub fn issue_token(config: &AuthConfig, user_id: i64) -> AppResult<String> {
    let exp = chrono::Utc::now().timestamp() + config.token_ttl_hours * 3600;
    let claims = Claims { sub: user_id, exp };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
}

pub fn verify_token(config: &AuthConfig, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::Unauthorized
    })
}

/// Extension to store current user in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub department_id: Option<i64>,
    pub role: Option<RoleKind>,
    pub status: i32,
}

impl CurrentUser {
    pub fn is_super_admin(&self) -> bool {
        self.role == Some(RoleKind::SuperAdmin)
    }

    /// Admin or Super Admin
    pub fn is_admin(&self) -> bool {
        self.role.map(|r| r.is_admin()).unwrap_or(false)
    }

    /// Admin rights over a given department
    pub fn admin_of(&self, department_id: i64) -> bool {
        match self.role {
            Some(RoleKind::SuperAdmin) => true,
            Some(RoleKind::Admin) => self.department_id == Some(department_id),
            _ => false,
        }
    }

    pub fn member_of(&self, department_id: i64) -> bool {
        self.department_id == Some(department_id)
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Load the acting user for a token subject; None when the account is
    /// gone, deleted or not active
    pub async fn load<C: ConnectionTrait>(db: &C, user_id: i64) -> AppResult<Option<Self>> {
        let Some(model) = user::Entity::find_by_id(user_id).one(db).await? else {
            return Ok(None);
        };
        if model.is_deleted() || UserStatus::from(model.status) != UserStatus::Active {
            return Ok(None);
        }

        let role = match model.role_id {
            Some(role_id) => role::Entity::find_by_id(role_id)
                .one(db)
                .await?
                .and_then(|r| r.kind()),
            None => None,
        };

        Ok(Some(Self {
            id: model.id,
            name: model.name,
            email: model.email,
            department_id: model.department_id,
            role,
            status: model.status,
        }))
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    // Only API routes are authenticated
    if !path.starts_with("/api") {
        return true;
    }

    if path == "/api/login" || path == "/api/health" {
        return true;
    }

    // Inline viewers fetch these without headers
    if let Some(rest) = path.strip_prefix("/api/documents/") {
        let mut parts = rest.split('/');
        if let (Some(id), Some(tail), None) = (parts.next(), parts.next(), parts.next()) {
            return id.parse::<i64>().is_ok() && (tail == "stream" || tail == "preview");
        }
    }
    false
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if is_public_path(&path) {
        return next.run(request).await;
    }

    let Some(Authorization(bearer)) = request.headers().typed_get::<Authorization<Bearer>>() else {
        return AppError::Unauthorized.into_response();
    };

    let claims = match verify_token(&state.config.auth, bearer.token()) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    match CurrentUser::load(&state.db, claims.sub).await {
        Ok(Some(current_user)) => {
            request.extensions_mut().insert(current_user);
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!("Token for unknown or inactive user: {}", claims.sub);
            AppError::Unauthorized.into_response()
        }
        Err(e) => {
            tracing::error!("Database error during auth: {}", e);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(role: Option<RoleKind>, department_id: Option<i64>) -> CurrentUser {
        CurrentUser {
            id: 1,
            name: "Ana".to_string(),
            email: "ana@example.org".to_string(),
            department_id,
            role,
            status: 1,
        }
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/"));
        assert!(is_public_path("/api/login"));
        assert!(is_public_path("/api/health"));
        assert!(is_public_path("/api/documents/12/stream"));
        assert!(is_public_path("/api/documents/12/preview"));
        assert!(!is_public_path("/api/documents/12/download"));
        assert!(!is_public_path("/api/documents/12/preview/regenerate"));
        assert!(!is_public_path("/api/documents/shared"));
        assert!(!is_public_path("/api/documents/x/stream"));
        assert!(!is_public_path("/api/me"));
    }

    #[test]
    fn test_token_round_trip() {
        let config = AuthConfig::default();
        let token = issue_token(&config, 42).unwrap();
        assert_eq!(verify_token(&config, &token).unwrap().sub, 42);

        let other = AuthConfig {
            jwt_secret: "another".to_string(),
            ..AuthConfig::default()
        };
        assert!(matches!(verify_token(&other, &token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = AuthConfig {
            token_ttl_hours: -1,
            ..AuthConfig::default()
        };
        let token = issue_token(&config, 42).unwrap();
        assert!(verify_token(&config, &token).is_err());
    }

    #[test]
    fn test_admin_scope() {
        let super_admin = user_with(Some(RoleKind::SuperAdmin), None);
        assert!(super_admin.admin_of(7));

        let admin = user_with(Some(RoleKind::Admin), Some(3));
        assert!(admin.admin_of(3));
        assert!(!admin.admin_of(7));
        assert!(admin.is_admin());

        let staff = user_with(Some(RoleKind::Staff), Some(3));
        assert!(!staff.admin_of(3));
        assert!(staff.member_of(3));
        assert!(staff.require_admin().is_err());

        let unassigned = user_with(None, None);
        assert!(!unassigned.is_admin());
        assert!(!unassigned.member_of(3));
    }
}
