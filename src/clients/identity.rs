//! Client for the external identity provider.
//!
//! Covers the two surfaces the provider exposes: RS256 token
//! verification against its JWKS, and the management API used for
//! directory CRUD (authenticated with the backend secret key).

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::jwks::JwksCache;

#[derive(Debug, Error)]
pub enum IdpError {
    #[error("Invalid identity token")]
    InvalidToken,

    #[error("JWKS error: {0}")]
    Jwks(String),

    #[error("Identity provider request failed: {0}")]
    Request(String),

    #[error("Identity provider returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Claims extracted from a verified provider token.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedToken {
    /// Provider-side user id.
    pub sub: String,
}

/// A user record as the provider's management API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<RemoteEmailAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEmailAddress {
    #[serde(default)]
    pub id: Option<String>,
    pub email_address: String,
}

impl RemoteUser {
    /// The address the provider lists first, if any.
    #[must_use]
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRemoteUser {
    pub email_address: Vec<String>,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRemoteUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListUsersQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Option<String>,
}

/// The identity provider as the rest of the system sees it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a provider-issued token and return its claims.
    async fn verify_token(&self, token: &str) -> Result<VerifiedToken, IdpError>;

    /// Fetch a user from the provider. `Ok(None)` when the provider has
    /// no such user.
    async fn get_user(&self, id: &str) -> Result<Option<RemoteUser>, IdpError>;

    async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<RemoteUser>, IdpError>;

    async fn create_user(&self, new: CreateRemoteUser) -> Result<RemoteUser, IdpError>;

    /// `Ok(None)` when the provider has no such user.
    async fn update_user(
        &self,
        id: &str,
        update: UpdateRemoteUser,
    ) -> Result<Option<RemoteUser>, IdpError>;

    /// Returns `false` when the provider has no such user.
    async fn delete_user(&self, id: &str) -> Result<bool, IdpError>;
}

/// Production implementation backed by the provider's HTTP API.
pub struct HttpIdentityProvider {
    api_url: String,
    secret_key: String,
    client: reqwest::Client,
    jwks: Arc<JwksCache>,
    validation: Validation,
}

impl HttpIdentityProvider {
    #[must_use]
    pub fn new(
        api_url: String,
        secret_key: String,
        jwks_url: String,
        issuer: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Self {
            api_url,
            secret_key,
            jwks: Arc::new(JwksCache::new(jwks_url, client.clone())),
            client,
            validation,
        }
    }

    fn users_url(&self, path: &str) -> String {
        format!("{}/users{}", self.api_url.trim_end_matches('/'), path)
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, IdpError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(IdpError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<VerifiedToken, IdpError> {
        let header = decode_header(token).map_err(|_| IdpError::InvalidToken)?;
        if header.alg != Algorithm::RS256 {
            return Err(IdpError::InvalidToken);
        }

        let key = self.jwks.get_key(header.kid.as_deref()).await?;

        let data = decode::<VerifiedToken>(token, &key, &self.validation).map_err(|e| {
            debug!("Identity token rejected: {e}");
            IdpError::InvalidToken
        })?;

        Ok(data.claims)
    }

    async fn get_user(&self, id: &str) -> Result<Option<RemoteUser>, IdpError> {
        let response = self
            .client
            .get(self.users_url(&format!("/{id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_response(response).await?;
        let user = response
            .json::<RemoteUser>()
            .await
            .map_err(|e| IdpError::Request(format!("Invalid user payload: {e}")))?;

        Ok(Some(user))
    }

    async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<RemoteUser>, IdpError> {
        let mut request = self
            .client
            .get(self.users_url(""))
            .bearer_auth(&self.secret_key);

        if let Some(limit) = query.limit {
            request = request.query(&[("limit", limit)]);
        }
        if let Some(offset) = query.offset {
            request = request.query(&[("offset", offset)]);
        }
        if let Some(order_by) = &query.order_by {
            request = request.query(&[("orderBy", order_by)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;
        let response = Self::check_response(response).await?;

        response
            .json::<Vec<RemoteUser>>()
            .await
            .map_err(|e| IdpError::Request(format!("Invalid user list payload: {e}")))
    }

    async fn create_user(&self, new: CreateRemoteUser) -> Result<RemoteUser, IdpError> {
        let response = self
            .client
            .post(self.users_url(""))
            .bearer_auth(&self.secret_key)
            .json(&new)
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;
        let response = Self::check_response(response).await?;

        response
            .json::<RemoteUser>()
            .await
            .map_err(|e| IdpError::Request(format!("Invalid user payload: {e}")))
    }

    async fn update_user(
        &self,
        id: &str,
        update: UpdateRemoteUser,
    ) -> Result<Option<RemoteUser>, IdpError> {
        let response = self
            .client
            .patch(self.users_url(&format!("/{id}")))
            .bearer_auth(&self.secret_key)
            .json(&update)
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_response(response).await?;
        let user = response
            .json::<RemoteUser>()
            .await
            .map_err(|e| IdpError::Request(format!("Invalid user payload: {e}")))?;

        Ok(Some(user))
    }

    async fn delete_user(&self, id: &str) -> Result<bool, IdpError> {
        let response = self
            .client
            .delete(self.users_url(&format!("/{id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        Self::check_response(response).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_email_is_first_listed_address() {
        let user: RemoteUser = serde_json::from_str(
            r#"{
                "id": "idp_1",
                "username": "ada",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "emailAddresses": [
                    { "id": "em_1", "emailAddress": "ada@example.com" },
                    { "id": "em_2", "emailAddress": "backup@example.com" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(user.primary_email(), Some("ada@example.com"));
        assert_eq!(user.first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn user_without_addresses_has_no_primary_email() {
        let user: RemoteUser = serde_json::from_str(r#"{ "id": "idp_2" }"#).unwrap();
        assert_eq!(user.primary_email(), None);
    }

    #[test]
    fn update_payload_omits_unset_fields() {
        let update = UpdateRemoteUser {
            username: Some("ada".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "username": "ada" }));
    }
}
