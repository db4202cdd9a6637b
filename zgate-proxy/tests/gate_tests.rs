//! Management gate chain: Session, Auth and CsrfToken stages, plus the
//! outer recovery and limit layers

mod common;

use std::sync::Arc;

use axum::http::{header, StatusCode};

use axum::Router;
use common::*;
use zgate_core::signature::{self, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, TOKEN_HEADER};
use zgate_core::ApiKey;
use zgate_proxy::cookie::{PROXY_COOKIE, SESSION_COOKIE};
use zgate_proxy::middleware::stages::{CSRF_HEADER, CSRF_QUERY};
use zgate_proxy::AppState;

async fn explode() -> &'static str {
    panic!("handler exploded")
}

fn with_explode() -> Router<Arc<AppState>> {
    Router::new().route("/explode", axum::routing::get(explode))
}

fn signed(key: &ApiKey, path: &str, nonce: &str) -> axum::http::request::Builder {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = signature::sign(&key.secret, &key.token, &timestamp, nonce, "GET", path).unwrap();

    get(HOST, path)
        .header(TOKEN_HEADER, &key.token)
        .header(TIMESTAMP_HEADER, timestamp)
        .header(NONCE_HEADER, nonce)
        .header(SIGNATURE_HEADER, signature)
}

#[tokio::test]
async fn test_check_requires_session() {
    let harness = Harness::management();

    let response = harness.send(empty(get(HOST, "/check"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Unauthorized");
}

#[tokio::test]
async fn test_check_with_csrf_token() {
    let harness = Harness::management();
    let session_id = harness.management_session("u1").await;

    let response = harness
        .send(empty(with_cookie(get(HOST, "/csrf"), SESSION_COOKIE, &session_id)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, &token);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["administrator"], true);
    assert_eq!(body["api"], false);
}

#[tokio::test]
async fn test_csrf_requires_session() {
    let harness = Harness::management();

    let response = harness.send(empty(get(HOST, "/csrf"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_csrf_token_rejected() {
    let harness = Harness::management();
    let session_id = harness.management_session("u1").await;

    // no token issued for the session yet
    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    harness.csrf_token(&session_id).await;
    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_csrf_token_rejected() {
    let harness = Harness::management();
    let session_id = harness.management_session("u1").await;
    harness.csrf_token(&session_id).await;

    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, "forged");
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_websocket_csrf_from_query() {
    let harness = Harness::management();
    let session_id = harness.management_session("u1").await;
    let token = harness.csrf_token(&session_id).await;

    let path = format!("/check?{}={}", CSRF_QUERY, token);
    let request = with_cookie(get(HOST, &path), SESSION_COOKIE, &session_id)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket");
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // upgrades only read the query parameter
    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(CSRF_HEADER, &token);
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_proxy_session_rejected_by_management() {
    let harness = Harness::management();
    let session_id = harness.proxy_session("u1").await;
    let token = harness.csrf_token(&session_id).await;

    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, token);
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = with_cookie(get(HOST, "/check"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_request_skips_csrf() {
    let harness = Harness::management();
    let key = harness.api_key("u1");

    let response = harness
        .send(empty(signed(&key, "/check", "0123456789abcdef0001")))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["api"], true);
}

#[tokio::test]
async fn test_signed_request_nonce_reuse_rejected() {
    let harness = Harness::management();
    let key = harness.api_key("u1");
    let nonce = "0123456789abcdef0002";

    let response = harness.send(empty(signed(&key, "/check", nonce))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness.send(empty(signed(&key, "/check", nonce))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_signature_rejected() {
    let harness = Harness::management();
    let key = harness.api_key("u1");

    let forged = ApiKey {
        secret: "guessed".to_string(),
        ..key
    };
    let request = empty(signed(&forged, "/check", "0123456789abcdef0003"));

    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_api_token_rejected() {
    let harness = Harness::management();
    let key = ApiKey {
        id: "k9".to_string(),
        token: "unregistered".to_string(),
        secret: "s".to_string(),
        user_id: "u1".to_string(),
    };

    let response = harness
        .send(empty(signed(&key, "/check", "0123456789abcdef0004")))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_admin_denied_with_payload() {
    let harness = Harness::management();
    let session_id = harness.management_session("u2").await;
    let token = harness.csrf_token(&session_id).await;

    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, token);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared = cookie_for(response.headers(), SESSION_COOKIE).unwrap();
    assert!(is_removal(&cleared));
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "unauthorized", "message": "Not authorized"})
    );
}

#[tokio::test]
async fn test_deactivated_user_loses_sessions() {
    let harness = Harness::management();
    let session_id = harness.management_session("u1").await;
    let other = harness.proxy_session("u1").await;
    let token = harness.csrf_token(&session_id).await;
    harness.stack.users.deactivate("u1");

    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, token);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared = cookie_for(response.headers(), SESSION_COOKIE).unwrap();
    assert!(is_removal(&cleared));
    assert!(!harness.stack.sessions.contains(&session_id));
    assert!(!harness.stack.sessions.contains(&other));
}

#[tokio::test]
async fn test_session_cleanup_failure_surfaces() {
    let harness = Harness::builder()
        .mode(zgate_proxy::NodeMode::Management)
        .customize(|state, stack| {
            state.sessions = Arc::new(BrokenRemoveAll(stack.sessions.clone()));
        })
        .build();
    let session_id = harness.management_session("u1").await;
    harness.stack.users.deactivate("u1");

    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Server error");
}

#[tokio::test]
async fn test_proxy_session_cleanup_failure_swallowed() {
    let harness = Harness::builder()
        .customize(|state, stack| {
            state.sessions = Arc::new(BrokenRemoveAll(stack.sessions.clone()));
        })
        .build();
    // bob fails the wiki policy, so the request reaches the public router
    let session_id = harness.proxy_session("u2").await;
    harness.stack.users.deactivate("u2");

    let request = with_cookie(get(HOST, "/auth/state"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_handler_panic_recovered() {
    let harness = Harness::builder()
        .mode(zgate_proxy::NodeMode::Management)
        .management_routes(with_explode())
        .build();
    let session_id = harness.management_session("u1").await;
    let token = harness.csrf_token(&session_id).await;

    let request = with_cookie(get(HOST, "/explode"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, &token);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Server error");
    assert_eq!(harness.stack.database.open_handles(), 0);

    // the node keeps serving
    let request = with_cookie(get(HOST, "/check"), SESSION_COOKIE, &session_id)
        .header(CSRF_HEADER, &token);
    assert_eq!(harness.send(empty(request)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_extra_routes_are_gated() {
    let harness = Harness::builder()
        .mode(zgate_proxy::NodeMode::Management)
        .management_routes(with_explode())
        .build();

    let response = harness.send(empty(get(HOST, "/explode"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let harness = Harness::management();

    let request = get(HOST, "/check")
        .method("POST")
        .header(header::CONTENT_LENGTH, "1000001")
        .body(axum::body::Body::from(vec![0u8; 1_000_001]))
        .unwrap();
    let response = harness.send(request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_oversized_headers_rejected() {
    let harness = Harness::management();

    let request = get(HOST, "/robots.txt").header("X-Padding", "a".repeat(4096));
    let response = harness.send(empty(request)).await;
    assert_eq!(response.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);

    let response = harness.send(empty(get(HOST, "/robots.txt"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_check_reports_request_count() {
    let harness = Harness::management();
    let key = harness.api_key("u1");

    harness.send(empty(get(HOST, "/robots.txt"))).await;
    let response = harness
        .send(empty(signed(&key, "/check", "0123456789abcdef0005")))
        .await;

    assert_eq!(body_json(response).await["requests"], 2);
}

#[tokio::test]
async fn test_unknown_management_path() {
    let harness = Harness::management();

    let response = harness.send(empty(get(HOST, "/nope"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Not found");
}
