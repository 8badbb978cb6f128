//! Edge-of-the-API tests that need no database: authentication rejection and
//! request validation both fire before any query is issued, so the state is
//! built over a lazy pool that never connects.
//!
//! The router is driven in-process via `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use tally_core::Service;
use tally_server::{auth::AuthService, routes, state::AppState};

const TEST_SECRET: &str = "test-secret";

fn lazy_state() -> Arc<AppState> {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost:5432/unused")
        .expect("lazy pool");
    Arc::new(AppState::new(
        Service::new(pool),
        AuthService::new(TEST_SECRET),
    ))
}

async fn status_of(req: Request<Body>) -> StatusCode {
    let router = routes::build_router(lazy_state());
    router.oneshot(req).await.expect("oneshot failed").status()
}

fn bearer() -> String {
    AuthService::new(TEST_SECRET)
        .generate_token(1)
        .expect("token")
}

// ---------------------------------------------------------------------------
// 401 without credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protected_routes_reject_missing_token() {
    for (method, uri) in [
        ("POST", "/api/user/orders"),
        ("GET", "/api/user/orders"),
        ("GET", "/api/user/balance"),
        ("POST", "/api/user/balance/withdraw"),
        ("GET", "/api/user/withdrawals"),
    ] {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            status_of(req).await,
            StatusCode::UNAUTHORIZED,
            "{method} {uri}"
        );
    }
}

#[tokio::test]
async fn forged_token_is_rejected() {
    let token = AuthService::new("not-the-server-secret")
        .generate_token(1)
        .unwrap();
    let req = Request::builder()
        .method("GET")
        .uri("/api/user/balance")
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Request validation (fires before the domain layer)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_with_malformed_json_is_400() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/user/register")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_malformed_json_is_400() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/user/login")
        .body(Body::from(r#"{"login": "u"}"#))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_upload_rejects_non_numbers_and_luhn_failures() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/user/orders")
        .header(header::AUTHORIZATION, bearer())
        .body(Body::from("not-a-number"))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);

    // Numeric but failing the mod-10 check.
    let req = Request::builder()
        .method("POST")
        .uri("/api/user/orders")
        .header(header::AUTHORIZATION, bearer())
        .body(Body::from("1"))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn withdraw_rejects_luhn_failures_with_422() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/user/balance/withdraw")
        .header(header::AUTHORIZATION, bearer())
        .body(Body::from(r#"{"order": "1234567890", "sum": 10}"#))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::UNPROCESSABLE_ENTITY);

    let req = Request::builder()
        .method("POST")
        .uri("/api/user/balance/withdraw")
        .header(header::AUTHORIZATION, bearer())
        .body(Body::from(r#"{"order": "abc", "sum": 10}"#))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bearer_prefix_is_tolerated() {
    // A syntactically valid token with the Bearer prefix passes the extractor
    // and reaches validation (422), proving the prefix was stripped.
    let req = Request::builder()
        .method("POST")
        .uri("/api/user/orders")
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer()))
        .body(Body::from("1"))
        .unwrap();
    assert_eq!(status_of(req).await, StatusCode::UNPROCESSABLE_ENTITY);
}
