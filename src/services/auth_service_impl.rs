//! `SeaORM` implementation of the `AuthService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::identity::IdentityProvider;
use crate::config::SecurityConfig;
use crate::db::{NewFederatedUser, NewLocalUser, Store, User};
use crate::services::auth_service::{
    AuthError, AuthService, AuthenticatedUser, Credential, LoginRequest, RegisterRequest,
};
use crate::services::session::SessionTokenService;

const MIN_PASSWORD_LENGTH: usize = 8;

pub struct SeaOrmAuthService {
    store: Store,
    identity: Arc<dyn IdentityProvider>,
    session_tokens: Arc<SessionTokenService>,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        identity: Arc<dyn IdentityProvider>,
        session_tokens: Arc<SessionTokenService>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            store,
            identity,
            session_tokens,
            security,
        }
    }

    /// Resolve an API key to an active account.
    async fn validate_api_key(&self, key: &str) -> Result<User, AuthError> {
        let user = self
            .store
            .find_user_by_api_key(key)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Resolve a session token to an active account.
    ///
    /// The account is re-read on every request so deactivation takes
    /// effect immediately even with an unexpired token.
    async fn validate_session_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self
            .session_tokens
            .verify(token)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .store
            .get_user_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Resolve a provider-issued token, provisioning a shadow record on
    /// first sight of the subject.
    async fn validate_federated_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.identity.verify_token(token).await.map_err(|e| {
            debug!("Federated token rejected: {e}");
            AuthError::InvalidCredentials
        })?;

        let local = self.store.get_user_by_federated_id(&claims.sub).await?;
        let remote = self.identity.get_user(&claims.sub).await.map_err(|e| {
            warn!("Identity provider lookup failed: {e}");
            AuthError::InvalidCredentials
        })?;

        let user = match (local, remote) {
            (Some(user), Some(_)) => user,
            // A shadow record whose subject the provider no longer knows
            // is treated as revoked.
            (Some(_), None) => return Err(AuthError::InvalidCredentials),
            (None, Some(remote)) => {
                let email = remote
                    .primary_email()
                    .ok_or(AuthError::InvalidCredentials)?
                    .to_string();

                self.store
                    .create_federated_user(NewFederatedUser {
                        federated_id: remote.id.clone(),
                        email,
                        user_name: remote.username.unwrap_or_default(),
                        first_name: remote.first_name.unwrap_or_default(),
                        last_name: remote.last_name.unwrap_or_default(),
                    })
                    .await
                    .map_err(|e| {
                        warn!("Shadow provisioning failed: {e}");
                        AuthError::InvalidCredentials
                    })?
            }
            (None, None) => return Err(AuthError::InvalidCredentials),
        };

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, request: RegisterRequest) -> Result<User, AuthError> {
        if request.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let user = self
            .store
            .create_local_user(
                NewLocalUser {
                    email: request.email,
                    password: request.password,
                    user_name: request.user_name,
                    first_name: request.first_name,
                    last_name: request.last_name,
                },
                &self.security,
            )
            .await?;

        Ok(user)
    }

    async fn login(&self, request: LoginRequest) -> Result<AuthenticatedUser, AuthError> {
        let user = self
            .store
            .get_active_user_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let is_valid = self
            .store
            .verify_user_password(&user.id, &request.password)
            .await?;
        if !is_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self
            .session_tokens
            .issue(&user.id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(AuthenticatedUser { user, token })
    }

    async fn check_status(&self, user: User) -> Result<AuthenticatedUser, AuthError> {
        let token = self
            .session_tokens
            .issue(&user.id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(AuthenticatedUser { user, token })
    }

    async fn authenticate(&self, credential: Credential) -> Result<User, AuthError> {
        match credential {
            Credential::ApiKey(key) => self.validate_api_key(&key).await,
            Credential::FederatedToken(token) => self.validate_federated_token(&token).await,
            Credential::SessionToken(token) => self.validate_session_token(&token).await,
        }
    }

    async fn issue_api_key(&self, user_id: &str) -> Result<crate::db::ApiKey, AuthError> {
        Ok(self.store.create_api_key(user_id).await?)
    }

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<crate::db::ApiKey>, AuthError> {
        Ok(self.store.list_api_keys(user_id).await?)
    }

    async fn revoke_api_key(&self, user_id: &str, key_id: &str) -> Result<(), AuthError> {
        if key_id.trim().is_empty() {
            return Err(AuthError::Validation("API key id is required".to_string()));
        }

        self.store
            .find_owned_api_key(user_id, key_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("API key not found".to_string()))?;

        let deleted = self.store.delete_owned_api_key(user_id, key_id).await?;
        if deleted == 0 {
            // Present a moment ago but gone at delete time.
            return Err(AuthError::Internal("Failed to delete API key".to_string()));
        }

        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        Ok(self.store.get_user_by_id(user_id).await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        Ok(self.store.list_users().await?)
    }
}
