use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use musik::clients::spotify::{SpotifyError, SpotifyFactory};
use musik::config::{Config, SpotifyConfig};
use musik::db::Store;
use musik::services::TokenRefreshObserver;

#[derive(Clone)]
struct MockProvider {
    grant_ok: bool,
}

async fn token_endpoint(State(mock): State<MockProvider>) -> Response {
    if mock.grant_ok {
        Json(serde_json::json!({
            "access_token": "fresh",
            "refresh_token": "refresh-2",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_grant"})),
        )
            .into_response()
    }
}

fn bearer(headers: &HeaderMap) -> &str {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

async fn me_endpoint(headers: HeaderMap) -> Response {
    match bearer(&headers) {
        "fresh" => Json(serde_json::json!({
            "id": "acct-1",
            "display_name": "Test Account",
            "email": "acct@example.com",
        }))
        .into_response(),
        "stale" => StatusCode::UNAUTHORIZED.into_response(),
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

async fn top_artists_endpoint(headers: HeaderMap) -> Response {
    match bearer(&headers) {
        "fresh" => Json(serde_json::json!({
            "items": [
                {"id": "a1", "name": "Boards of Canada", "genres": ["idm"], "popularity": 70},
                {"id": "a2", "name": "Caribou", "genres": [], "popularity": 65},
            ],
            "total": 2,
        }))
        .into_response(),
        "stale" => StatusCode::UNAUTHORIZED.into_response(),
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

/// Minimal stand-in for the provider: a token endpoint plus the two API
/// routes the app calls, bound to an ephemeral local port.
async fn spawn_mock_provider(grant_ok: bool) -> String {
    let app = Router::new()
        .route("/api/token", post(token_endpoint))
        .route("/v1/me", get(me_endpoint))
        .route("/v1/me/top/artists", get(top_artists_endpoint))
        .with_state(MockProvider { grant_ok });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock provider");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Mock provider died");
    });

    format!("http://{addr}")
}

fn spotify_config(base_url: &str) -> SpotifyConfig {
    let mut config = SpotifyConfig::default();
    config.client_id = "test-client".to_string();
    config.client_secret = "test-secret".to_string();
    config.accounts_base_url = base_url.to_string();
    config.api_base_url = base_url.to_string();
    config
}

async fn factory_with_observer(store: &Store, base_url: &str) -> SpotifyFactory {
    let http = reqwest::Client::new();
    let observer = Arc::new(TokenRefreshObserver::new(
        store.clone(),
        http.clone(),
        base_url,
    ));
    SpotifyFactory::new(spotify_config(base_url), http).with_refresh_listener(observer)
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let base_url = spawn_mock_provider(true).await;
    let store = Store::new("sqlite::memory:").await.unwrap();

    let user = store
        .create_user("alice@example.com", "alice", "hunter2secret", None)
        .await
        .unwrap();
    store
        .create_connection(user.id, "spotify", "stale", "refresh-1", "acct-1")
        .await
        .unwrap();

    let factory = factory_with_observer(&store, &base_url).await;
    let client = factory.client_for_tokens("stale", "refresh-1").await;

    // First call 401s, the client refreshes once and retries
    let me = client.me().await.unwrap();
    assert_eq!(me.id, "acct-1");

    // The refreshed pair reached the store through the observer
    let conn = store
        .get_connection(user.id, "spotify")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conn.access_token, "fresh");
    assert_eq!(conn.refresh_token, "refresh-2");
}

#[tokio::test]
async fn test_top_artists_parse() {
    let base_url = spawn_mock_provider(true).await;
    let store = Store::new("sqlite::memory:").await.unwrap();

    let factory = factory_with_observer(&store, &base_url).await;
    let client = factory.client_for_tokens("fresh", "refresh-1").await;

    let artists = client.top_artists("long_term", 10).await.unwrap();
    assert_eq!(artists.len(), 2);
    assert_eq!(artists[0].name, "Boards of Canada");
    assert_eq!(artists[0].genres, vec!["idm".to_string()]);
}

#[tokio::test]
async fn test_client_token_mirroring() {
    let base_url = spawn_mock_provider(true).await;
    let store = Store::new("sqlite::memory:").await.unwrap();

    let factory = factory_with_observer(&store, &base_url).await;
    let client = factory.client_for_tokens("stale", "refresh-1").await;
    assert!(client.is_usable().await);

    // Mirrored tokens replace the seeded pair before the next call
    client.set_access_token("fresh").await;
    client.set_refresh_token("refresh-2").await;
    assert_eq!(client.provider_user_id().await.unwrap(), "acct-1");
}

#[tokio::test]
async fn test_forbidden_surfaces_as_bad_grant() {
    let base_url = spawn_mock_provider(true).await;
    let store = Store::new("sqlite::memory:").await.unwrap();

    let factory = factory_with_observer(&store, &base_url).await;
    let client = factory.client_for_tokens("revoked", "whatever").await;

    let result = client.me().await;
    assert!(matches!(result, Err(SpotifyError::BadGrant)));
}

#[tokio::test]
async fn test_dead_refresh_token_surfaces_as_bad_grant() {
    let base_url = spawn_mock_provider(false).await;
    let store = Store::new("sqlite::memory:").await.unwrap();

    let user = store
        .create_user("alice@example.com", "alice", "hunter2secret", None)
        .await
        .unwrap();
    store
        .create_connection(user.id, "spotify", "stale", "dead", "acct-1")
        .await
        .unwrap();

    let factory = factory_with_observer(&store, &base_url).await;
    let client = factory.client_for_tokens("stale", "dead").await;

    // 401 triggers a refresh, which the token endpoint rejects outright
    let result = client.me().await;
    assert!(matches!(result, Err(SpotifyError::BadGrant)));

    // A failed refresh must not touch the stored pair
    let conn = store
        .get_connection(user.id, "spotify")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conn.access_token, "stale");
    assert_eq!(conn.refresh_token, "dead");
}

#[tokio::test]
async fn test_connect_flow_links_account() {
    let base_url = spawn_mock_provider(true).await;

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.verification.secret = "test-verification-secret".to_string();
    config.spotify = spotify_config(&base_url);

    let state = musik::api::create_app_state_from_config(config, None)
        .await
        .unwrap();
    let app = musik::api::router(state.clone()).await;

    let user = state
        .store()
        .create_user("alice@example.com", "alice", "hunter2secret", None)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": "alice@example.com", "password": "hunter2secret"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // Kick off the flow; the redirect carries the state we must echo back
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/connect/spotify")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.contains("/authorize?"));

    // Callback with a mismatched state is rejected
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/connect/spotify/check?code=any-code&state=forged")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The state was consumed; restart the flow for the real callback
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/connect/spotify")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let oauth_state = location
        .split("state=")
        .nth(1)
        .unwrap()
        .split('&')
        .next()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/connect/spotify/check?code=any-code&state={oauth_state}"
                ))
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get("location").unwrap(), "/");

    let conn = state
        .store()
        .get_connection(user.id, "spotify")
        .await
        .unwrap()
        .expect("connection should be linked");
    assert_eq!(conn.access_token, "fresh");
    assert_eq!(conn.refresh_token, "refresh-2");
    assert_eq!(conn.provider_user_id, "acct-1");

    // Disconnect removes the link again
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/connect/spotify")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        state
            .store()
            .get_connection(user.id, "spotify")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_callback_rejects_when_already_connected() {
    let base_url = spawn_mock_provider(true).await;

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.verification.secret = "test-verification-secret".to_string();
    config.spotify = spotify_config(&base_url);

    let state = musik::api::create_app_state_from_config(config, None)
        .await
        .unwrap();
    let app = musik::api::router(state.clone()).await;

    let user = state
        .store()
        .create_user("alice@example.com", "alice", "hunter2secret", None)
        .await
        .unwrap();
    state
        .store()
        .create_connection(user.id, "spotify", "stale", "refresh-1", "acct-1")
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": "alice@example.com", "password": "hunter2secret"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // The callback bails out before exchanging the code or touching the row
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/connect/spotify/check?code=any-code&state=whatever")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get("location").unwrap(), "/");

    let conn = state
        .store()
        .get_connection(user.id, "spotify")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conn.access_token, "stale");
    assert_eq!(conn.refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_bad_grant_recovery_removes_connection() {
    let base_url = spawn_mock_provider(false).await;

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.verification.secret = "test-verification-secret".to_string();
    config.spotify = spotify_config(&base_url);

    let state = musik::api::create_app_state_from_config(config, None)
        .await
        .unwrap();
    let app = musik::api::router(state.clone()).await;

    let user = state
        .store()
        .create_user("alice@example.com", "alice", "hunter2secret", None)
        .await
        .unwrap();
    state
        .store()
        .create_connection(user.id, "spotify", "stale", "dead", "acct-1")
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": "alice@example.com", "password": "hunter2secret"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // The home view hits the provider, the grant turns out revoked, and the
    // recovery layer converts the failure into a redirect.
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
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get("location").unwrap(), "/");

    let conn = state.store().get_connection(user.id, "spotify").await.unwrap();
    assert!(conn.is_none(), "revoked connection should be removed");

    // After the redirect the home view loads cleanly and explains what happened
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

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["spotify_connected"], false);
    let flashes = json["data"]["flashes"].as_array().unwrap();
    assert_eq!(flashes.len(), 1);
    assert_eq!(flashes[0]["kind"], "error");
    assert!(
        flashes[0]["message"]
            .as_str()
            .unwrap()
            .contains("no longer valid")
    );
}
