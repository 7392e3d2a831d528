//! Admin-facing directory management: CRUD against the identity
//! provider with the local shadow records kept in sync.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::clients::identity::{IdpError, ListUsersQuery, RemoteUser};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Identity provider error: {0}")]
    Provider(#[source] IdpError),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl From<anyhow::Error> for DirectoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDirectoryUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDirectoryUser {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<RemoteUser>, DirectoryError>;

    async fn get_user(&self, id: &str) -> Result<RemoteUser, DirectoryError>;

    /// Create the account at the provider, then provision its local
    /// shadow record.
    async fn create_user(&self, new: CreateDirectoryUser) -> Result<RemoteUser, DirectoryError>;

    /// Update the provider account and propagate profile fields to the
    /// shadow record if one exists.
    async fn update_user(
        &self,
        id: &str,
        update: UpdateDirectoryUser,
    ) -> Result<RemoteUser, DirectoryError>;

    /// Delete the provider account and its shadow record.
    async fn delete_user(&self, id: &str) -> Result<(), DirectoryError>;
}
