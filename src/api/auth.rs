use axum::{
    Json,
    extract::{FromRequestParts, Path, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, decode_header};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState,
    types::{ApiKeyDto, LoginResponse, MessageResponse, UserDto},
};
use crate::db::{Role, User};
use crate::services::auth_service::{AuthError, Credential, LoginRequest, RegisterRequest};

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::unauthorized(),
            AuthError::EmailTaken => Self::Conflict(err.to_string()),
            AuthError::Validation(msg) => Self::ValidationError(msg),
            AuthError::NotFound(msg) => Self::NotFound(msg),
            AuthError::Database(e) => Self::DatabaseError(e.to_string()),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware. Classifies the presented credential by
/// transport shape, validates it, and stashes the resolved account in
/// request extensions for extractors and role gates downstream.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = extract_credential(&headers).ok_or_else(ApiError::unauthorized)?;

    let user = state.auth_service().authenticate(credential).await?;

    tracing::Span::current().record("user_id", &user.id);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Classify the request's credential:
/// 1. `Api-Key: <key>` header
/// 2. `Authorization: Bearer <jwt>`, split by JOSE header algorithm
///    (RS256 = identity provider, HS256 = session token)
///
/// Anything else, including an unparsable bearer token, classifies as
/// no credential at all.
fn extract_credential(headers: &HeaderMap) -> Option<Credential> {
    if let Some(api_key) = headers.get("Api-Key")
        && let Ok(key_str) = api_key.to_str()
        && !key_str.trim().is_empty()
    {
        return Some(Credential::ApiKey(key_str.trim().to_string()));
    }

    let auth_header = headers.get("Authorization")?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }

    match decode_header(token).ok()?.alg {
        Algorithm::RS256 => Some(Credential::FederatedToken(token.to_string())),
        Algorithm::HS256 => Some(Credential::SessionToken(token.to_string())),
        _ => None,
    }
}

/// Gate for routes any authenticated account may reach.
pub async fn require_user(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&request, Role::User)?;
    Ok(next.run(request).await)
}

/// Gate for admin-only routes.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&request, Role::Admin)?;
    Ok(next.run(request).await)
}

fn require_role(request: &Request, role: Role) -> Result<(), ApiError> {
    let user = request
        .extensions()
        .get::<User>()
        .ok_or_else(ApiError::unauthorized)?;

    if user.roles.contains(&role) {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

/// Extractor for the account resolved by [`auth_middleware`].
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(ApiError::unauthorized)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
/// Create a password-backed account. Responds with an acknowledgement,
/// not a session; the caller logs in separately.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state.auth_service().register(payload).await?;
    tracing::info!("Registered user {}", user.id);

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User registered successfully",
    ))))
}

/// GET /auth/login
/// Verify email + password from the JSON body and issue a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let authenticated = state.auth_service().login(payload).await?;

    Ok(Json(ApiResponse::success(LoginResponse {
        token: authenticated.token,
        user: UserDto::from(authenticated.user),
    })))
}

/// GET /auth/me
/// Current account, re-read so the response reflects the row as it is
/// now rather than as it was when the credential was validated.
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let fresh = state
        .auth_service()
        .get_user(&user.id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    Ok(Json(ApiResponse::success(UserDto::from(fresh))))
}

/// GET /auth/status
/// Token refresh: re-issues a session token for the current account.
pub async fn check_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let refreshed = state.auth_service().check_status(user).await?;

    Ok(Json(ApiResponse::success(LoginResponse {
        token: refreshed.token,
        user: UserDto::from(refreshed.user),
    })))
}

/// GET /auth/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    let users = state.auth_service().list_users().await?;

    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from).collect(),
    )))
}

/// POST /auth/api-keys
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<ApiKeyDto>>, ApiError> {
    let key = state.auth_service().issue_api_key(&user.id).await?;
    tracing::info!("Issued API key {} for user {}", key.id, user.id);

    Ok(Json(ApiResponse::success(ApiKeyDto::from(key))))
}

/// GET /auth/api-keys
pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<ApiKeyDto>>>, ApiError> {
    let keys = state.auth_service().list_api_keys(&user.id).await?;

    Ok(Json(ApiResponse::success(
        keys.into_iter().map(ApiKeyDto::from).collect(),
    )))
}

/// DELETE /auth/api-keys/{id}
pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(key_id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .revoke_api_key(&user.id, &key_id)
        .await?;
    tracing::info!("Revoked API key {key_id} for user {}", user.id);

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "API key deleted",
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn unsigned_jwt(alg: &str) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(format!("{{\"alg\":\"{alg}\",\"typ\":\"JWT\"}}"));
        let payload = engine.encode(r#"{"sub":"u1"}"#);
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn api_key_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("Api-Key", "abc123".parse().unwrap());
        headers.insert(
            "Authorization",
            format!("Bearer {}", unsigned_jwt("HS256")).parse().unwrap(),
        );

        assert!(matches!(
            extract_credential(&headers),
            Some(Credential::ApiKey(key)) if key == "abc123"
        ));
    }

    #[test]
    fn bearer_tokens_classify_by_algorithm() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", unsigned_jwt("RS256")).parse().unwrap(),
        );
        assert!(matches!(
            extract_credential(&headers),
            Some(Credential::FederatedToken(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", unsigned_jwt("HS256")).parse().unwrap(),
        );
        assert!(matches!(
            extract_credential(&headers),
            Some(Credential::SessionToken(_))
        ));
    }

    #[test]
    fn unrecognized_shapes_carry_no_credential() {
        assert!(extract_credential(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer not-a-jwt".parse().unwrap());
        assert!(extract_credential(&headers).is_none());

        // A well-formed token with an algorithm no strategy accepts.
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", unsigned_jwt("ES256")).parse().unwrap(),
        );
        assert!(extract_credential(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("Api-Key", "  ".parse().unwrap());
        assert!(extract_credential(&headers).is_none());
    }
}
