use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::db::repositories::user::User;
use crate::entities::api_keys;

/// API-key data returned from the repository. The owner is carried as a
/// bare id; responses never echo the owning user object back.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: String,
    pub key: String,
    pub is_active: bool,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<api_keys::Model> for ApiKey {
    fn from(model: api_keys::Model) -> Self {
        Self {
            id: model.id,
            key: model.key,
            is_active: model.is_active,
            user_id: model.user_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct ApiKeyRepository {
    conn: DatabaseConnection,
}

impl ApiKeyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create a new key for the given owner.
    pub async fn create(&self, user_id: &str) -> Result<ApiKey> {
        let now = chrono::Utc::now().to_rfc3339();
        let model = api_keys::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            key: Set(generate_api_key()),
            is_active: Set(true),
            user_id: Set(user_id.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        let inserted = model
            .insert(&self.conn)
            .await
            .context("Failed to insert API key")?;

        Ok(ApiKey::from(inserted))
    }

    /// List all keys owned by the given user, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>> {
        let keys = api_keys::Entity::find()
            .filter(api_keys::Column::UserId.eq(user_id))
            .order_by_desc(api_keys::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list API keys")?;

        Ok(keys.into_iter().map(ApiKey::from).collect())
    }

    /// Look up a key by id, scoped to the owner.
    ///
    /// Ownership is folded into the query predicate so another user's key
    /// is indistinguishable from a nonexistent one.
    pub async fn find_owned(&self, user_id: &str, key_id: &str) -> Result<Option<ApiKey>> {
        let key = api_keys::Entity::find()
            .filter(api_keys::Column::Id.eq(key_id))
            .filter(api_keys::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query API key")?;

        Ok(key.map(ApiKey::from))
    }

    /// Delete a key by id, scoped to the owner. Returns rows affected.
    pub async fn delete_owned(&self, user_id: &str, key_id: &str) -> Result<u64> {
        let result = api_keys::Entity::delete_many()
            .filter(api_keys::Column::Id.eq(key_id))
            .filter(api_keys::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete API key")?;

        Ok(result.rows_affected)
    }

    /// Resolve a presented key to its owner.
    ///
    /// Only active keys match; the caller still has to check the owner's
    /// active flag before trusting the principal.
    pub async fn find_owner_by_key(&self, key: &str) -> Result<Option<User>> {
        let Some(api_key) = api_keys::Entity::find()
            .filter(api_keys::Column::Key.eq(key))
            .filter(api_keys::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query API key by value")?
        else {
            return Ok(None);
        };

        let owner = api_key
            .find_related(crate::entities::users::Entity)
            .one(&self.conn)
            .await
            .context("Failed to load API key owner")?;

        Ok(owner.map(User::from))
    }
}

/// Generate a cryptographically random API key (64-char hex string).
#[must_use]
pub fn generate_api_key() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
