//! Products resource. The catalogue itself is not built yet; the
//! routes exist so clients can integrate against the final surface.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, types::MessageResponse};

/// POST /products
pub async fn create_product(
    State(_state): State<Arc<AppState>>,
    Json(_payload): Json<Value>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "This action adds a new product",
    ))))
}

/// GET /products
pub async fn list_products(
    State(_state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "This action returns all products",
    ))))
}

/// GET /products/{id}
pub async fn get_product(
    State(_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "This action returns a #{id} product"
    )))))
}

/// PATCH /products/{id}
pub async fn update_product(
    State(_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(_payload): Json<Value>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "This action updates a #{id} product"
    )))))
}

/// DELETE /products/{id}
pub async fn delete_product(
    State(_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "This action removes a #{id} product"
    )))))
}
