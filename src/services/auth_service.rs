//! Authentication service contract: registration, login, credential
//! validation and API-key management.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::db::{ApiKey, CreateUserError, User};

/// A credential as presented on a request, already classified by
/// transport shape but not yet validated.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Opaque key from the `Api-Key` header.
    ApiKey(String),
    /// RS256 bearer token issued by the identity provider.
    FederatedToken(String),
    /// HS256 bearer token issued by this service at login.
    SessionToken(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Any credential failure. Deliberately carries no detail; the
    /// response body must not reveal which check failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err)
    }
}

impl From<CreateUserError> for AuthError {
    fn from(err: CreateUserError) -> Self {
        match err {
            CreateUserError::EmailTaken => Self::EmailTaken,
            CreateUserError::EmailMissing => Self::Validation("Email is required".to_string()),
            CreateUserError::Other(e) => Self::Database(e),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A successful login: the account plus a freshly signed session token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create a password-backed account. The new account is not logged
    /// in; the caller authenticates separately.
    async fn register(&self, request: RegisterRequest) -> Result<User, AuthError>;

    /// Verify email + password and issue a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email,
    /// inactive account, or wrong password alike.
    async fn login(&self, request: LoginRequest) -> Result<AuthenticatedUser, AuthError>;

    /// Re-issue a session token for an already-authenticated account,
    /// without re-presenting credentials.
    async fn check_status(&self, user: User) -> Result<AuthenticatedUser, AuthError>;

    /// Validate a presented credential and resolve it to an account.
    ///
    /// All failure modes collapse to [`AuthError::InvalidCredentials`].
    async fn authenticate(&self, credential: Credential) -> Result<User, AuthError>;

    async fn issue_api_key(&self, user_id: &str) -> Result<ApiKey, AuthError>;

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, AuthError>;

    /// Revoke a key owned by `user_id`. Another user's key id behaves
    /// exactly like a nonexistent one.
    async fn revoke_api_key(&self, user_id: &str, key_id: &str) -> Result<(), AuthError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AuthError>;

    async fn list_users(&self) -> Result<Vec<User>, AuthError>;
}
