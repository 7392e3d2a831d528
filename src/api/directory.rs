//! Admin endpoints for managing accounts at the identity provider.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, types::MessageResponse};
use crate::clients::identity::{ListUsersQuery, RemoteUser};
use crate::services::directory_service::{
    CreateDirectoryUser, DirectoryError, UpdateDirectoryUser,
};

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Validation(msg) => Self::ValidationError(msg),
            DirectoryError::NotFound(msg) => Self::NotFound(msg),
            DirectoryError::Conflict(msg) => Self::Conflict(msg),
            DirectoryError::Provider(e) => Self::InternalError(e.to_string()),
            DirectoryError::Database(e) => Self::DatabaseError(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Option<String>,
}

/// GET /auth/idp/users
pub async fn list_idp_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<RemoteUser>>>, ApiError> {
    let users = state
        .directory_service()
        .list_users(ListUsersQuery {
            limit: query.limit,
            offset: query.offset,
            order_by: query.order_by,
        })
        .await?;

    Ok(Json(ApiResponse::success(users)))
}

/// GET /auth/idp/users/{id}
pub async fn get_idp_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RemoteUser>>, ApiError> {
    let user = state.directory_service().get_user(&id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /auth/idp/users
pub async fn create_idp_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDirectoryUser>,
) -> Result<Json<ApiResponse<RemoteUser>>, ApiError> {
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state.directory_service().create_user(payload).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// PATCH /auth/idp/users/{id}
pub async fn update_idp_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateDirectoryUser>,
) -> Result<Json<ApiResponse<RemoteUser>>, ApiError> {
    let user = state.directory_service().update_user(&id, payload).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// DELETE /auth/idp/users/{id}
pub async fn delete_idp_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.directory_service().delete_user(&id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User deleted",
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use http_body_util::BodyExt;

    use crate::clients::identity::IdpError;

    #[tokio::test]
    async fn provider_failures_surface_as_internal_errors() {
        let err: ApiError =
            DirectoryError::Provider(IdpError::Request("connection refused".to_string())).into();
        assert!(matches!(err, ApiError::InternalError(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "An internal error occurred");
    }
}
