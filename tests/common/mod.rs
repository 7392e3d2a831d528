#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use base64::Engine;
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tower::ServiceExt;

use keywarden::api::AppState;
use keywarden::clients::identity::{
    CreateRemoteUser, IdentityProvider, IdpError, ListUsersQuery, RemoteEmailAddress, RemoteUser,
    UpdateRemoteUser, VerifiedToken,
};
use keywarden::config::Config;
use keywarden::entities::users;

pub const SESSION_SECRET: &str = "test-session-secret-test-session-secret";

/// In-memory stand-in for the identity provider. Tokens are matched by
/// exact string against a registered subject.
#[derive(Default)]
pub struct FakeIdentityProvider {
    tokens: Mutex<HashMap<String, String>>,
    users: Mutex<HashMap<String, RemoteUser>>,
    next_id: AtomicU64,
}

impl FakeIdentityProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a provider account and return a bearer token for it.
    pub fn add_user(&self, id: &str, email: &str, username: &str) -> String {
        self.users.lock().unwrap().insert(
            id.to_string(),
            RemoteUser {
                id: id.to_string(),
                username: Some(username.to_string()),
                first_name: Some("Test".to_string()),
                last_name: Some("User".to_string()),
                email_addresses: vec![RemoteEmailAddress {
                    id: Some(format!("em_{id}")),
                    email_address: email.to_string(),
                }],
            },
        );

        let token = federated_token(id);
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), id.to_string());
        token
    }

    pub fn remove_user(&self, id: &str) {
        self.users.lock().unwrap().remove(id);
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<VerifiedToken, IdpError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .map(|sub| VerifiedToken { sub: sub.clone() })
            .ok_or(IdpError::InvalidToken)
    }

    async fn get_user(&self, id: &str) -> Result<Option<RemoteUser>, IdpError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<RemoteUser>, IdpError> {
        let mut users: Vec<RemoteUser> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));

        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap();
        let users: Vec<RemoteUser> = users.into_iter().skip(offset).collect();
        match query.limit {
            Some(limit) => Ok(users
                .into_iter()
                .take(usize::try_from(limit).unwrap())
                .collect()),
            None => Ok(users),
        }
    }

    async fn create_user(&self, new: CreateRemoteUser) -> Result<RemoteUser, IdpError> {
        let id = format!("idp_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let user = RemoteUser {
            id: id.clone(),
            username: new.username,
            first_name: new.first_name,
            last_name: new.last_name,
            email_addresses: new
                .email_address
                .into_iter()
                .map(|email_address| RemoteEmailAddress {
                    id: None,
                    email_address,
                })
                .collect(),
        };

        self.users.lock().unwrap().insert(id, user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: &str,
        update: UpdateRemoteUser,
    ) -> Result<Option<RemoteUser>, IdpError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(id) else {
            return Ok(None);
        };

        if let Some(username) = update.username {
            user.username = Some(username);
        }
        if let Some(first_name) = update.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            user.last_name = Some(last_name);
        }

        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: &str) -> Result<bool, IdpError> {
        Ok(self.users.lock().unwrap().remove(id).is_some())
    }
}

/// Build a token the credential classifier treats as provider-issued:
/// a structurally valid JWT whose JOSE header says RS256. The fake
/// provider matches it by exact string, so the signature is garbage.
pub fn federated_token(subject: &str) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"RS256","kid":"test"}"#);
    let payload = engine.encode(format!(r#"{{"sub":"{subject}"}}"#));
    let signature = engine.encode(b"not-a-real-signature");
    format!("{header}.{payload}.{signature}")
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    // A second pool connection would see a fresh in-memory database.
    config.database.max_connections = 1;
    config.auth.session_secret = SESSION_SECRET.to_string();
    config.identity.api_url = "https://idp.test/v1".to_string();
    config.identity.secret_key = "sk_test_secret".to_string();
    config
}

pub async fn spawn_app() -> (Router, Arc<AppState>, Arc<FakeIdentityProvider>) {
    let idp = FakeIdentityProvider::new();
    let state = keywarden::api::create_app_state_with_identity(test_config(), idp.clone(), None)
        .await
        .expect("Failed to create app state");
    let app = keywarden::api::router(state.clone());
    (app, state, idp)
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", mime::APPLICATION_JSON.as_ref())
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn register_user(app: &Router, email: &str, password: &str) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            &serde_json::json!({
                "email": email,
                "password": password,
                "user_name": "tester",
                "first_name": "Test",
                "last_name": "User",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Log in and return the session token.
pub async fn login_user(app: &Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "GET",
            "/api/auth/login",
            &serde_json::json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["data"]["token"].as_str().unwrap().to_string()
}

pub async fn register_and_login(app: &Router, email: &str, password: &str) -> String {
    register_user(app, email, password).await;
    login_user(app, email, password).await
}

/// Grant the admin role directly in the database.
pub async fn promote_to_admin(state: &AppState, email: &str) {
    let user = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(&state.store().conn)
        .await
        .unwrap()
        .expect("user to promote");

    let mut active: users::ActiveModel = user.into();
    active.roles = Set(r#"["admin","user"]"#.to_string());
    active.update(&state.store().conn).await.unwrap();
}
