//! Proxy dispatch through the full web router

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use common::*;
use zgate_proxy::cookie::{PROXY_COOKIE, SESSION_COOKIE};
use zgate_proxy::NodeMode;

#[tokio::test]
async fn test_unknown_host_not_found() {
    let harness = Harness::proxy();

    let response = harness.send(empty(get("nowhere.example.com", "/"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Not found");
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_empty_pool_not_found() {
    let harness = Harness::proxy();

    let response = harness.send(empty(get(EMPTY_HOST, "/"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_host_not_found() {
    let harness = Harness::proxy();

    let request = axum::extract::Request::builder()
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_no_cookie_serves_login_page() {
    let harness = Harness::proxy();

    let response = harness.send(empty(get(HOST, "/"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_for(response.headers(), PROXY_COOKIE).is_none());
    assert!(body_text(response).await.contains("zgate-login"));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_login_page_at_login_path() {
    let harness = Harness::proxy();

    let response = harness.send(empty(get(HOST, "/login"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Sign in"));
}

#[tokio::test]
async fn test_stale_cookie_cleared() {
    let harness = Harness::proxy();

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, "expired-session");
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = cookie_for(response.headers(), PROXY_COOKIE).unwrap();
    assert!(is_removal(&cleared));
    assert!(body_text(response).await.contains("zgate-login"));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_unknown_path_without_session_not_found() {
    let harness = Harness::proxy();

    let response = harness.send(empty(get(HOST, "/reports/2024"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_authorized_request_forwarded() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;

    let request = with_cookie(get(HOST, "/reports/2024"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_for(response.headers(), PROXY_COOKIE).is_none());
    let body = body_text(response).await;
    assert!(body.starts_with("backend-"));
    assert!(body.ends_with("/reports/2024 0"));
    assert_eq!(harness.total_hits(), 1);
}

#[tokio::test]
async fn test_forwarded_with_csrf_header() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;
    let token = harness.csrf_token(&session_id).await;

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id)
        .header("Csrf-Token", token);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.starts_with("backend-"));
}

#[tokio::test]
async fn test_policy_denied_served_public() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u2").await;

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = cookie_for(response.headers(), PROXY_COOKIE).unwrap();
    assert!(is_removal(&cleared));
    assert!(body_text(response).await.contains("zgate-login"));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_session_for_other_service_served_public() {
    let harness = Harness::proxy();
    let session_id = harness
        .session("u1", zgate_core::SessionScope::Service("billing".to_string()))
        .await;

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert!(cookie_for(response.headers(), PROXY_COOKIE).is_some());
    assert!(body_text(response).await.contains("zgate-login"));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_management_session_not_accepted_by_proxy() {
    let harness = Harness::proxy();
    let session_id = harness.management_session("u1").await;

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert!(body_text(response).await.contains("zgate-login"));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_session_of_missing_user_served_public() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("ghost").await;

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = cookie_for(response.headers(), PROXY_COOKIE).unwrap();
    assert!(is_removal(&cleared));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_session_store_failure_is_server_error() {
    let harness = Harness::builder()
        .customize(|state, _| state.sessions = Arc::new(UnavailableSessions))
        .build();

    let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, "any");
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Server error");
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_host_port_ignored_for_routing() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;

    let request = with_cookie(get("a.example.com:8443", "/"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert!(body_text(response).await.starts_with("backend-"));
}

#[tokio::test]
async fn test_balancer_reproducible_with_seed() {
    async fn sequence(seed: u64) -> Vec<String> {
        let harness = Harness::builder().seed(seed).build();
        let session_id = harness.proxy_session("u1").await;

        let mut picks = Vec::new();
        for _ in 0..24 {
            let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id);
            let body = body_text(harness.send(empty(request)).await).await;
            picks.push(body.split(' ').next().unwrap().to_string());
        }
        picks
    }

    let first = sequence(11).await;
    assert_eq!(first, sequence(11).await);
    assert!(first.iter().any(|b| b == "backend-0"));
    assert!(first.iter().any(|b| b == "backend-1"));
}

#[tokio::test]
async fn test_balancer_spreads_load() {
    let harness = Harness::builder().seed(3).build();
    let session_id = harness.proxy_session("u1").await;

    for _ in 0..2000 {
        let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, &session_id);
        assert_eq!(harness.send(empty(request)).await.status(), StatusCode::OK);
    }

    let hits = harness.hits();
    assert_eq!(hits.iter().sum::<usize>(), 2000);
    for count in hits {
        assert!((900..=1100).contains(&count), "uneven split: {}", count);
    }
}

#[tokio::test]
async fn test_body_streamed_to_backend() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;

    let request = with_cookie(get(HOST, "/upload"), PROXY_COOKIE, &session_id)
        .method("POST")
        .body(Body::from("hello"))
        .unwrap();
    let response = harness.send(request).await;

    assert!(body_text(response).await.ends_with("/upload 5"));
}

#[tokio::test]
async fn test_declared_oversized_body_rejected() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;

    let request = with_cookie(get(HOST, "/upload"), PROXY_COOKIE, &session_id)
        .method("POST")
        .header(header::CONTENT_LENGTH, "1000001")
        .body(Body::from(vec![0u8; 1_000_001]))
        .unwrap();
    let response = harness.send(request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_streamed_oversized_body_cut_off() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;

    let request = with_cookie(get(HOST, "/upload"), PROXY_COOKIE, &session_id)
        .method("POST")
        .body(Body::from(vec![0u8; 1_000_001]))
        .unwrap();
    let response = harness.send(request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_oversized_headers_rejected() {
    let harness = Harness::proxy();

    let request = get(HOST, "/").header("X-Padding", "a".repeat(5000));
    let response = harness.send(empty(request)).await;

    assert_eq!(response.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
}

#[tokio::test]
async fn test_management_mode_ignores_host() {
    let harness = Harness::management();

    let response = harness.send(empty(get(HOST, "/robots.txt"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "User-agent: *\nDisallow: /\n");

    let response = harness.send(empty(get(HOST, "/check"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_management_proxy_splits_on_host() {
    let harness = Harness::builder().mode(NodeMode::ManagementProxy).build();

    let response = harness.send(empty(get(ADMIN_HOST, "/check"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness.send(empty(get("admin.example.com:443", "/check"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness.send(empty(get(HOST, "/"))).await;
    assert!(body_text(response).await.contains("zgate-login"));

    let session_id = harness.proxy_session("u1").await;
    let request = with_cookie(get(HOST, "/check"), PROXY_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;
    assert!(body_text(response).await.starts_with("backend-"));
}

#[tokio::test]
async fn test_proxy_ignores_management_cookie_name() {
    let harness = Harness::proxy();
    let session_id = harness.proxy_session("u1").await;

    let request = with_cookie(get(HOST, "/"), SESSION_COOKIE, &session_id);
    let response = harness.send(empty(request)).await;

    assert!(body_text(response).await.contains("zgate-login"));
    assert_eq!(harness.total_hits(), 0);
}

#[tokio::test]
async fn test_database_handles_released() {
    let harness = Harness::proxy();
    let allowed = harness.proxy_session("u1").await;
    let denied = harness.proxy_session("u2").await;

    for session_id in [allowed.as_str(), denied.as_str(), "unknown"] {
        let request = with_cookie(get(HOST, "/"), PROXY_COOKIE, session_id);
        let _ = body_text(harness.send(empty(request)).await).await;
    }
    let _ = harness.send(empty(get(HOST, "/auth/state"))).await;

    assert_eq!(harness.stack.database.open_handles(), 0);
}

#[tokio::test]
async fn test_requests_counted() {
    let harness = Harness::proxy();

    for _ in 0..3 {
        harness.send(empty(get(HOST, "/"))).await;
    }
    harness.send(empty(get("nowhere.example.com", "/"))).await;

    assert_eq!(harness.state.node.requests(), 4);
}
