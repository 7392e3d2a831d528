//! `SeaORM`-backed implementation of the `DirectoryService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clients::identity::{
    CreateRemoteUser, IdentityProvider, IdpError, ListUsersQuery, RemoteUser, UpdateRemoteUser,
};
use crate::db::{CreateUserError, NewFederatedUser, Store};
use crate::services::directory_service::{
    CreateDirectoryUser, DirectoryError, DirectoryService, UpdateDirectoryUser,
};

pub struct SeaOrmDirectoryService {
    store: Store,
    identity: Arc<dyn IdentityProvider>,
}

impl SeaOrmDirectoryService {
    #[must_use]
    pub fn new(store: Store, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Provision or update the local shadow record for a provider account.
    async fn sync_shadow(&self, remote: &RemoteUser) -> Result<(), DirectoryError> {
        let user_name = remote.username.clone().unwrap_or_default();
        let first_name = remote.first_name.clone().unwrap_or_default();
        let last_name = remote.last_name.clone().unwrap_or_default();

        if let Some(local) = self.store.get_user_by_federated_id(&remote.id).await? {
            self.store
                .sync_user_profile(&local.id, &user_name, &first_name, &last_name)
                .await?;
            return Ok(());
        }

        let Some(email) = remote.primary_email() else {
            warn!("Provider account {} has no email; shadow skipped", remote.id);
            return Ok(());
        };

        match self
            .store
            .create_federated_user(NewFederatedUser {
                federated_id: remote.id.clone(),
                email: email.to_string(),
                user_name,
                first_name,
                last_name,
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(CreateUserError::EmailTaken) => Err(DirectoryError::Conflict(
                "Email already registered to another account".to_string(),
            )),
            Err(CreateUserError::EmailMissing) => Err(DirectoryError::Validation(
                "Email is required".to_string(),
            )),
            Err(CreateUserError::Other(e)) => Err(DirectoryError::Database(e)),
        }
    }
}

fn map_idp_error(err: IdpError) -> DirectoryError {
    match err {
        // The provider's response body is logged, never echoed to the
        // caller.
        IdpError::Api { status: 422, body } => {
            warn!("Identity provider rejected a request: {body}");
            DirectoryError::Validation("Identity provider rejected the request".to_string())
        }
        other => DirectoryError::Provider(other),
    }
}

#[async_trait]
impl DirectoryService for SeaOrmDirectoryService {
    async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<RemoteUser>, DirectoryError> {
        self.identity.list_users(query).await.map_err(map_idp_error)
    }

    async fn get_user(&self, id: &str) -> Result<RemoteUser, DirectoryError> {
        self.identity
            .get_user(id)
            .await
            .map_err(map_idp_error)?
            .ok_or_else(|| DirectoryError::NotFound(format!("User {id} not found")))
    }

    async fn create_user(&self, new: CreateDirectoryUser) -> Result<RemoteUser, DirectoryError> {
        let email = new.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(DirectoryError::Validation("Email is required".to_string()));
        }

        // Refuse before touching the provider if the email is already
        // claimed by a local account.
        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(DirectoryError::Conflict(
                "Email already registered".to_string(),
            ));
        }

        let remote = self
            .identity
            .create_user(CreateRemoteUser {
                email_address: vec![email],
                password: new.password,
                username: new.user_name,
                first_name: new.first_name,
                last_name: new.last_name,
            })
            .await
            .map_err(map_idp_error)?;

        self.sync_shadow(&remote).await?;
        info!("Provisioned directory user {}", remote.id);

        Ok(remote)
    }

    async fn update_user(
        &self,
        id: &str,
        update: UpdateDirectoryUser,
    ) -> Result<RemoteUser, DirectoryError> {
        let remote = self
            .identity
            .update_user(
                id,
                UpdateRemoteUser {
                    username: update.user_name,
                    first_name: update.first_name,
                    last_name: update.last_name,
                },
            )
            .await
            .map_err(map_idp_error)?
            .ok_or_else(|| DirectoryError::NotFound(format!("User {id} not found")))?;

        self.sync_shadow(&remote).await?;

        Ok(remote)
    }

    async fn delete_user(&self, id: &str) -> Result<(), DirectoryError> {
        let deleted = self.identity.delete_user(id).await.map_err(map_idp_error)?;
        if !deleted {
            return Err(DirectoryError::NotFound(format!("User {id} not found")));
        }

        if let Some(local) = self.store.get_user_by_federated_id(id).await? {
            if !self.store.remove_user(&local.id).await? {
                warn!("Shadow record for {id} was already gone");
            }
        } else {
            warn!("No shadow record for deleted provider account {id}");
        }

        info!("Deleted directory user {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprocessable_responses_become_sanitized_validation_errors() {
        let err = map_idp_error(IdpError::Api {
            status: 422,
            body: r#"{"errors":[{"message":"username leaked-internal-detail"}]}"#.to_string(),
        });

        match err {
            DirectoryError::Validation(msg) => {
                assert_eq!(msg, "Identity provider rejected the request");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn other_provider_failures_stay_provider_errors() {
        let err = map_idp_error(IdpError::Api {
            status: 500,
            body: "upstream exploded".to_string(),
        });
        assert!(matches!(err, DirectoryError::Provider(_)));

        let err = map_idp_error(IdpError::Request("timed out".to_string()));
        assert!(matches!(err, DirectoryError::Provider(_)));
    }
}
