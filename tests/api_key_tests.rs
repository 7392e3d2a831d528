mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use common::{bearer_request, body_json, register_and_login, spawn_app};

fn api_key_request(method: &str, uri: &str, key: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Api-Key", key)
        .body(Body::empty())
        .unwrap()
}

async fn issue_key(app: &axum::Router, token: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(bearer_request("POST", "/api/auth/api-keys", token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn issued_key_is_opaque_and_grants_access() {
    let (app, _state, _idp) = spawn_app().await;
    let token = register_and_login(&app, "ada@example.com", "correct-horse").await;

    let body = issue_key(&app, &token).await;
    let key = body["data"]["key"].as_str().unwrap();

    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(body["data"]["is_active"], true);
    // The owner is a bare id, never an embedded account object.
    assert!(body["data"]["user_id"].is_string());
    assert!(body["data"].get("user").is_none());

    let response = app
        .clone()
        .oneshot(api_key_request("GET", "/api/auth/me", key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["email"], "ada@example.com");
}

#[tokio::test]
async fn key_of_deactivated_owner_is_rejected_while_key_row_stays_active() {
    let (app, state, _idp) = spawn_app().await;
    let token = register_and_login(&app, "ada@example.com", "correct-horse").await;

    let body = issue_key(&app, &token).await;
    let key = body["data"]["key"].as_str().unwrap().to_string();

    {
        use keywarden::entities::users;
        use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

        let user = users::Entity::find()
            .filter(users::Column::Email.eq("ada@example.com"))
            .one(&state.store().conn)
            .await
            .unwrap()
            .unwrap();
        let mut active: users::ActiveModel = user.into();
        active.is_active = Set(false);
        active.update(&state.store().conn).await.unwrap();
    }

    let response = app
        .clone()
        .oneshot(api_key_request("GET", "/api/auth/me", &key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Only the owner was deactivated; the key row itself is untouched.
    {
        use keywarden::entities::api_keys;
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

        let row = api_keys::Entity::find()
            .filter(api_keys::Column::Key.eq(key.as_str()))
            .one(&state.store().conn)
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_active);
    }
}

#[tokio::test]
async fn unknown_api_key_is_rejected() {
    let (app, _state, _idp) = spawn_app().await;
    register_and_login(&app, "ada@example.com", "correct-horse").await;

    let response = app
        .clone()
        .oneshot(api_key_request("GET", "/api/auth/me", &"f".repeat(64)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn keys_are_listed_newest_first_per_owner() {
    let (app, _state, _idp) = spawn_app().await;
    let ada = register_and_login(&app, "ada@example.com", "correct-horse").await;
    let bob = register_and_login(&app, "bob@example.com", "correct-horse").await;

    let first = issue_key(&app, &ada).await;
    let second = issue_key(&app, &ada).await;
    issue_key(&app, &bob).await;

    let response = app
        .clone()
        .oneshot(bearer_request("GET", "/api/auth/api-keys", &ada))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let keys = body["data"].as_array().unwrap();

    assert_eq!(keys.len(), 2);
    let ids: Vec<&str> = keys.iter().map(|k| k["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&first["data"]["id"].as_str().unwrap()));
    assert!(ids.contains(&second["data"]["id"].as_str().unwrap()));
}

#[tokio::test]
async fn revoking_a_key_disables_it() {
    let (app, _state, _idp) = spawn_app().await;
    let token = register_and_login(&app, "ada@example.com", "correct-horse").await;

    let body = issue_key(&app, &token).await;
    let key = body["data"]["key"].as_str().unwrap().to_string();
    let key_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(bearer_request(
            "DELETE",
            &format!("/api/auth/api-keys/{key_id}"),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The key no longer authenticates.
    let response = app
        .clone()
        .oneshot(api_key_request("GET", "/api/auth/me", &key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Revoking again reads as absent.
    let response = app
        .clone()
        .oneshot(bearer_request(
            "DELETE",
            &format!("/api/auth/api-keys/{key_id}"),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn another_users_key_reads_as_absent() {
    let (app, _state, _idp) = spawn_app().await;
    let ada = register_and_login(&app, "ada@example.com", "correct-horse").await;
    let bob = register_and_login(&app, "bob@example.com", "correct-horse").await;

    let body = issue_key(&app, &ada).await;
    let key_id = body["data"]["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(bearer_request(
            "DELETE",
            &format!("/api/auth/api-keys/{key_id}"),
            &bob,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Ada still owns a working key.
    let response = app
        .clone()
        .oneshot(bearer_request("GET", "/api/auth/api-keys", &ada))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn blank_key_id_is_a_validation_error() {
    let (_app, state, _idp) = spawn_app().await;

    let err = state
        .auth_service()
        .revoke_api_key("some-user", "  ")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        keywarden::services::AuthError::Validation(_)
    ));
}
