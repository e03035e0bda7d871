use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use musik::api::AppState;
use musik::config::Config;
use tower::ServiceExt;

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.verification.secret = "test-verification-secret".to_string();

    let state = musik::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    let app = musik::api::router(state.clone()).await;
    (app, state)
}

async fn create_user(state: &Arc<AppState>, email: &str, username: &str) -> i32 {
    state
        .store()
        .create_user(email, username, "hunter2secret", None)
        .await
        .expect("Failed to create user")
        .id
}

/// Logs in and returns the session cookie plus the issued CSRF token.
async fn login(app: &Router, email: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": email, "password": "hunter2secret"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("login should set a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let csrf = json["data"]["csrf_token"].as_str().unwrap().to_string();

    (cookie, csrf)
}

fn action_request(method: &str, uri: &str, cookie: &str, csrf: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Cookie", cookie)
        .header("X-Requested-With", "XMLHttpRequest")
        .header("X-CSRF-Token", csrf)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice@example.com", "alice").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": "alice@example.com", "password": "wrong"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": "nobody@example.com", "password": "hunter2secret"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_home_is_public() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice@example.com", "alice").await;

    // Anonymous visitors get the bare payload, not a 401
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"]["user"].is_null());
    assert!(json["data"].get("csrf_token").is_none());
    assert_eq!(json["data"]["spotify_connected"], false);
    assert_eq!(json["data"]["flashes"].as_array().unwrap().len(), 0);

    let (cookie, _) = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["user"]["username"], "alice");
    assert!(json["data"]["csrf_token"].is_string());
    assert_eq!(json["data"]["spotify_connected"], false);
}

#[tokio::test]
async fn test_follow_and_unfollow_flow() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice@example.com", "alice").await;
    let bob_id = create_user(&state, "bob@example.com", "bobby").await;

    let (cookie, csrf) = login(&app, "alice@example.com").await;
    let follow_uri = format!("/api/action/user/{bob_id}/follow");

    let response = app
        .clone()
        .oneshot(action_request("POST", &follow_uri, &cookie, &csrf))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let csrf = response
        .headers()
        .get("x-csrf-token")
        .expect("guarded action should rotate the token")
        .to_str()
        .unwrap()
        .to_string();
    let json = body_json(response).await;
    assert_eq!(json["data"]["message"], "You are now following bobby");

    // The follow is already in place; repeating it is a validation error.
    let response = app
        .clone()
        .oneshot(action_request("POST", &follow_uri, &cookie, &csrf))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let csrf = response
        .headers()
        .get("x-csrf-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let json = body_json(response).await;
    assert_eq!(json["error"], "You already follow this user");

    let response = app
        .clone()
        .oneshot(action_request("DELETE", &follow_uri, &cookie, &csrf))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let csrf = response
        .headers()
        .get("x-csrf-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(action_request("DELETE", &follow_uri, &cookie, &csrf))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "You don't follow this user");
}

#[tokio::test]
async fn test_action_guard_checks_in_order() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice@example.com", "alice").await;
    let bob_id = create_user(&state, "bob@example.com", "bobby").await;
    let follow_uri = format!("/api/action/user/{bob_id}/follow");

    // No session at all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&follow_uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (cookie, csrf) = login(&app, "alice@example.com").await;

    // Session but no AJAX header
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&follow_uri)
                .header("Cookie", &cookie)
                .header("X-CSRF-Token", &csrf)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // AJAX but wrong CSRF token
    let response = app
        .clone()
        .oneshot(action_request("POST", &follow_uri, &cookie, "bogus-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_follow_validation() {
    let (app, state) = spawn_app().await;
    let alice_id = create_user(&state, "alice@example.com", "alice").await;

    let (cookie, csrf) = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(action_request(
            "POST",
            &format!("/api/action/user/{alice_id}/follow"),
            &cookie,
            &csrf,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let csrf = response
        .headers()
        .get("x-csrf-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let json = body_json(response).await;
    assert_eq!(json["error"], "You cannot follow yourself");

    let response = app
        .clone()
        .oneshot(action_request(
            "POST",
            "/api/action/user/99999/follow",
            &cookie,
            &csrf,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_page() {
    let (app, state) = spawn_app().await;
    let alice_id = create_user(&state, "alice@example.com", "alice").await;
    let bob_id = create_user(&state, "bob@example.com", "bobby").await;

    state
        .store()
        .follow(alice_id, bob_id)
        .await
        .expect("Failed to seed follow");
    state
        .store()
        .create_post(bob_id, "spotify:track:4uLU6hMCjMI75M1A2tKUQC", "on repeat all week")
        .await
        .expect("Failed to seed post");

    // Profiles are public
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bobby")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["user"]["username"], "bobby");
    assert_eq!(json["data"]["followers"], 1);
    assert_eq!(json["data"]["following"], 0);
    assert_eq!(json["data"]["followed_by_viewer"], false);
    assert_eq!(json["data"]["posts"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"]["top_artists"].as_array().unwrap().len(), 0);

    // With a session, the follow relation is reported
    let (cookie, _) = login(&app, "alice@example.com").await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bobby")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"]["followed_by_viewer"], true);

    // Unknown and malformed usernames both read as not found
    for uri in ["/ghost", "/ab"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {uri}");
    }
}

#[tokio::test]
async fn test_email_verification_link() {
    let (app, state) = spawn_app().await;
    let alice_id = create_user(&state, "alice@example.com", "alice").await;

    let expires = chrono::Utc::now().timestamp() + 3600;
    let signature = musik::services::verification::sign(
        "test-verification-secret",
        alice_id,
        "alice@example.com",
        expires,
    );

    // Tampered signature is rejected and the user stays unverified
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/verify/email?id={alice_id}&expires={expires}&signature=deadbeef"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let user = state.store().get_user(alice_id).await.unwrap().unwrap();
    assert!(!user.is_verified);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/verify/email?id={alice_id}&expires={expires}&signature={signature}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let user = state.store().get_user(alice_id).await.unwrap().unwrap();
    assert!(user.is_verified);

    // Expired links are rejected even with a valid signature
    let stale = chrono::Utc::now().timestamp() - 10;
    let stale_sig = musik::services::verification::sign(
        "test-verification-secret",
        alice_id,
        "alice@example.com",
        stale,
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/verify/email?id={alice_id}&expires={stale}&signature={stale_sig}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_verification_cooldown() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice@example.com", "alice").await;

    let (cookie, _) = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/verify/email/resend")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second request lands inside the cooldown window
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/verify/email/resend")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("wait before requesting")
    );
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice@example.com", "alice").await;

    let (cookie, _) = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The cookie no longer maps to a user; home reads as anonymous
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"]["user"].is_null());
}
