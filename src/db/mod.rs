use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::api_key::ApiKey;
pub use repositories::user::{CreateUserError, NewFederatedUser, NewLocalUser, Role, User};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn api_key_repo(&self) -> repositories::api_key::ApiKeyRepository {
        repositories::api_key::ApiKeyRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_active_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_active_by_email(email).await
    }

    pub async fn get_user_by_federated_id(&self, federated_id: &str) -> Result<Option<User>> {
        self.user_repo().get_by_federated_id(federated_id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn create_local_user(
        &self,
        new: NewLocalUser,
        security: &SecurityConfig,
    ) -> Result<User, CreateUserError> {
        self.user_repo().create_local(new, security).await
    }

    pub async fn create_federated_user(
        &self,
        new: NewFederatedUser,
    ) -> Result<User, CreateUserError> {
        self.user_repo().create_federated(new).await
    }

    pub async fn verify_user_password(&self, user_id: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(user_id, password).await
    }

    pub async fn sync_user_profile(
        &self,
        user_id: &str,
        user_name: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User> {
        self.user_repo()
            .sync_profile(user_id, user_name, first_name, last_name)
            .await
    }

    pub async fn remove_user(&self, user_id: &str) -> Result<bool> {
        self.user_repo().remove(user_id).await
    }

    // ========== API keys ==========

    pub async fn create_api_key(&self, user_id: &str) -> Result<ApiKey> {
        self.api_key_repo().create(user_id).await
    }

    pub async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>> {
        self.api_key_repo().list_for_user(user_id).await
    }

    pub async fn find_owned_api_key(&self, user_id: &str, key_id: &str) -> Result<Option<ApiKey>> {
        self.api_key_repo().find_owned(user_id, key_id).await
    }

    pub async fn delete_owned_api_key(&self, user_id: &str, key_id: &str) -> Result<u64> {
        self.api_key_repo().delete_owned(user_id, key_id).await
    }

    pub async fn find_user_by_api_key(&self, key: &str) -> Result<Option<User>> {
        self.api_key_repo().find_owner_by_key(key).await
    }
}
