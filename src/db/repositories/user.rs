use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

/// Role tags granted to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub roles: Vec<Role>,
    pub federated_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            user_name: model.user_name,
            first_name: model.first_name,
            last_name: model.last_name,
            is_active: model.is_active,
            roles: decode_roles(&model.roles),
            federated_id: model.federated_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Input for creating a password-backed account.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
    pub email: String,
    pub password: String,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
}

/// Input for provisioning a shadow record for a federated identity.
#[derive(Debug, Clone)]
pub struct NewFederatedUser {
    pub federated_id: String,
    pub email: String,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
}

/// Typed failures for the two account-creation paths. Everything else
/// stays an opaque repository error.
#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    EmailTaken,
    #[error("email is required")]
    EmailMissing,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get user by normalized email, regardless of active flag
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(normalize_email(email)))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    /// Get an active user by normalized email (login path)
    pub async fn get_active_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(normalize_email(email)))
            .filter(users::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query active user by email")?;

        Ok(user.map(User::from))
    }

    /// Get user by the identity provider's subject identifier
    pub async fn get_by_federated_id(&self, federated_id: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::FederatedId.eq(federated_id))
            .one(&self.conn)
            .await
            .context("Failed to query user by federated ID")?;

        Ok(user.map(User::from))
    }

    /// List all users
    pub async fn list(&self) -> Result<Vec<User>> {
        let users = users::Entity::find()
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(users.into_iter().map(User::from).collect())
    }

    /// Create a password-backed account with default role `user`.
    ///
    /// Email uniqueness is checked here (normalized) before the insert;
    /// a race that slips past the check still surfaces as `EmailTaken`
    /// via the unique constraint.
    pub async fn create_local(
        &self,
        new: NewLocalUser,
        security: &SecurityConfig,
    ) -> Result<User, CreateUserError> {
        let email = normalize_email(&new.email);
        if email.is_empty() {
            return Err(CreateUserError::EmailMissing);
        }
        if self.get_by_email(&email).await?.is_some() {
            return Err(CreateUserError::EmailTaken);
        }

        let password = new.password;
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();
        let model = users::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(email),
            user_name: Set(new.user_name),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            password_hash: Set(Some(password_hash)),
            is_active: Set(true),
            roles: Set(encode_roles(&[Role::User])),
            federated_id: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            deleted_at: Set(None),
        };

        match model.insert(&self.conn).await {
            Ok(inserted) => Ok(User::from(inserted)),
            Err(err) if is_unique_violation(&err) => Err(CreateUserError::EmailTaken),
            Err(err) => Err(CreateUserError::Other(
                anyhow::Error::new(err).context("Failed to insert user"),
            )),
        }
    }

    /// Provision a shadow record for a federated identity, idempotently.
    ///
    /// Two concurrent calls for the same subject both succeed: the loser
    /// of the insert race re-reads by federated ID and returns the row
    /// the winner created. A unique violation with no matching federated
    /// row means the email belongs to another account.
    pub async fn create_federated(&self, new: NewFederatedUser) -> Result<User, CreateUserError> {
        let email = normalize_email(&new.email);
        if email.is_empty() {
            return Err(CreateUserError::EmailMissing);
        }
        if let Some(existing) = self.get_by_email(&email).await? {
            // A concurrent call for the same subject may have landed
            // first; that is a success, not a collision.
            if existing.federated_id.as_deref() == Some(new.federated_id.as_str()) {
                return Ok(existing);
            }
            return Err(CreateUserError::EmailTaken);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let model = users::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(email),
            user_name: Set(new.user_name),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            password_hash: Set(None),
            is_active: Set(true),
            roles: Set(encode_roles(&[Role::User])),
            federated_id: Set(Some(new.federated_id.clone())),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            deleted_at: Set(None),
        };

        match model.insert(&self.conn).await {
            Ok(inserted) => Ok(User::from(inserted)),
            Err(err) if is_unique_violation(&err) => {
                match self.get_by_federated_id(&new.federated_id).await? {
                    Some(existing) => Ok(existing),
                    None => Err(CreateUserError::EmailTaken),
                }
            }
            Err(err) => Err(CreateUserError::Other(
                anyhow::Error::new(err).context("Failed to insert federated user"),
            )),
        }
    }

    /// Verify password for a user
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, user_id: &str, password: &str) -> Result<bool> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };
        let Some(password_hash) = user.password_hash else {
            return Ok(false);
        };

        let password = password.to_string();

        // Run CPU-intensive password verification in a blocking task
        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Overwrite the profile fields kept in sync with the identity provider
    pub async fn sync_profile(
        &self,
        user_id: &str,
        user_name: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for profile sync")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.user_name = Set(user_name.to_string());
        active.first_name = Set(first_name.to_string());
        active.last_name = Set(last_name.to_string());
        active.updated_at = Set(now);
        let updated = active.update(&self.conn).await?;

        Ok(User::from(updated))
    }

    /// Delete a user row; API keys cascade. Returns false if the row was
    /// already gone.
    pub async fn remove(&self, user_id: &str) -> Result<bool> {
        let result = users::Entity::delete_by_id(user_id)
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected > 0)
    }
}

/// Lowercase + trim, applied to every email before storage or comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None, // output length (use default)
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

fn encode_roles(roles: &[Role]) -> String {
    serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string())
}

fn decode_roles(raw: &str) -> Vec<Role> {
    // Unknown or corrupt role data degrades to no roles, never a panic.
    serde_json::from_str(raw).unwrap_or_default()
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
        assert_eq!(normalize_email("plain@host"), "plain@host");
        assert_eq!(normalize_email("   "), "");
    }

    #[test]
    fn roles_round_trip_through_json_column() {
        let encoded = encode_roles(&[Role::Admin, Role::User]);
        assert_eq!(encoded, r#"["admin","user"]"#);
        assert_eq!(decode_roles(&encoded), vec![Role::Admin, Role::User]);
    }

    #[test]
    fn corrupt_roles_column_decodes_to_empty() {
        assert_eq!(decode_roles("not json"), Vec::<Role>::new());
        assert_eq!(decode_roles(r#"["superuser"]"#), Vec::<Role>::new());
    }

    #[test]
    fn hash_password_produces_verifiable_argon2id() {
        let config = SecurityConfig::default();
        let hash = hash_password("hunter2hunter2", &config).unwrap();
        assert!(hash.starts_with("$argon2id$"));

        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(
            Argon2::default()
                .verify_password(b"hunter2hunter2", &parsed)
                .is_ok()
        );
        assert!(
            Argon2::default()
                .verify_password(b"wrong-password", &parsed)
                .is_err()
        );
    }
}
