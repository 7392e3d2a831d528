use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::clients::identity::IdentityProvider;
use crate::config::Config;
use crate::state::SharedState;

pub mod auth;
mod directory;
mod error;
mod observability;
mod products;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn crate::services::AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn directory_service(&self) -> &Arc<dyn crate::services::DirectoryService> {
        &self.shared.directory_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Like [`create_app_state_from_config`] but with the identity provider
/// supplied by the caller instead of built from configuration.
pub async fn create_app_state_with_identity(
    config: Config,
    identity: Arc<dyn IdentityProvider>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::with_identity_provider(config, identity).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/register", post(auth::register))
        .route("/auth/login", get(auth::login))
        .route("/system/health/live", get(system::health_live))
        .route("/system/health/ready", get(system::health_ready))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Any valid credential reaches these, no role required.
    let authenticated_routes = Router::new()
        .route("/auth/me", get(auth::get_current_user))
        .route("/system/status", get(system::get_status))
        .route("/metrics", get(observability::get_metrics));

    // Requires the `user` role.
    let user_routes = Router::new()
        .route("/auth/status", get(auth::check_status))
        .route("/auth/users", get(auth::list_users))
        .route("/auth/api-keys", post(auth::create_api_key))
        .route("/auth/api-keys", get(auth::list_api_keys))
        .route("/auth/api-keys/{id}", delete(auth::delete_api_key))
        .route("/products", get(products::list_products))
        .route("/products", post(products::create_product))
        .route("/products/{id}", get(products::get_product))
        .route("/products/{id}", patch(products::update_product))
        .route("/products/{id}", delete(products::delete_product))
        .route_layer(middleware::from_fn(auth::require_user));

    // Requires the `admin` role.
    let admin_routes = Router::new()
        .route("/auth/idp/users", get(directory::list_idp_users))
        .route("/auth/idp/users", post(directory::create_idp_user))
        .route("/auth/idp/users/{id}", get(directory::get_idp_user))
        .route("/auth/idp/users/{id}", patch(directory::update_idp_user))
        .route("/auth/idp/users/{id}", delete(directory::delete_idp_user))
        .route_layer(middleware::from_fn(auth::require_admin));

    authenticated_routes
        .merge(user_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
