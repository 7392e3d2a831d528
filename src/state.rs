use std::sync::Arc;

use crate::clients::identity::{HttpIdentityProvider, IdentityProvider};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, DirectoryService, SeaOrmAuthService, SeaOrmDirectoryService, SessionTokenService,
};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// This client should be reused across all HTTP-based services to enable
/// connection pooling and avoid socket exhaustion.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent(concat!("Keywarden/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub identity: Arc<dyn IdentityProvider>,

    pub session_tokens: Arc<SessionTokenService>,

    pub auth_service: Arc<dyn AuthService>,

    pub directory_service: Arc<dyn DirectoryService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = build_shared_http_client(config.identity.request_timeout_seconds)?;

        let identity: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::new(
            config.identity.api_url.clone(),
            config.identity.secret_key.clone(),
            config.jwks_url(),
            config.identity.issuer.clone(),
            http_client,
        ));

        Self::with_identity_provider(config, identity).await
    }

    /// Wire up state around a caller-supplied identity provider.
    pub async fn with_identity_provider(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        let session_tokens = Arc::new(SessionTokenService::new(
            &config.auth.session_secret,
            config.auth.session_ttl_hours,
        ));

        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            identity.clone(),
            session_tokens.clone(),
            config.security.clone(),
        ));

        let directory_service: Arc<dyn DirectoryService> =
            Arc::new(SeaOrmDirectoryService::new(store.clone(), identity.clone()));

        Ok(Self {
            config,
            store,
            identity,
            session_tokens,
            auth_service,
            directory_service,
        })
    }
}
