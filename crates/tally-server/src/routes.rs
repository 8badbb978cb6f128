//! Axum router and all HTTP handlers.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! layers after this call so the scenario tests in `tests/` can drive the
//! bare router in-process.  Handlers are thin: decode, Luhn-gate where the
//! contract requires it, call the domain service, map the outcome to a
//! status code.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::error;

use tally_core::ServiceError;

use crate::{
    api_types::{BalanceResponse, Credentials, OrderResponse, WithdrawRequest, WithdrawalResponse},
    auth::AuthUser,
    luhn,
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .route("/api/user/orders", post(upload_order).get(list_orders))
        .route("/api/user/balance", get(balance))
        .route("/api/user/balance/withdraw", post(withdraw))
        .route("/api/user/withdrawals", get(list_withdrawals))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /api/user/register
// ---------------------------------------------------------------------------

async fn register(State(st): State<Arc<AppState>>, body: String) -> Response {
    let Ok(creds) = serde_json::from_str::<Credentials>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let hash = match st.auth.hash_password(creds.password).await {
        Ok(hash) => hash,
        Err(err) => return internal(err.into()),
    };

    match st.service.register_user(&creds.login, &hash).await {
        Ok(user_id) => authorized_ok(&st, user_id),
        Err(ServiceError::LoginTaken) => StatusCode::CONFLICT.into_response(),
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// POST /api/user/login
// ---------------------------------------------------------------------------

async fn login(State(st): State<Arc<AppState>>, body: String) -> Response {
    let Ok(creds) = serde_json::from_str::<Credentials>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let user = match st.service.user_by_login(&creds.login).await {
        Ok(user) => user,
        Err(ServiceError::NotFound) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => return internal(err.into()),
    };

    if !st
        .auth
        .verify_password(creds.password, user.password_hash.clone())
        .await
    {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    authorized_ok(&st, user.id)
}

// ---------------------------------------------------------------------------
// POST /api/user/orders  (text/plain decimal order number)
// ---------------------------------------------------------------------------

async fn upload_order(
    State(st): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: String,
) -> Response {
    let Ok(order_id) = body.trim().parse::<i64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if !luhn::is_valid(order_id) {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }

    match st.service.create_order(user_id, order_id).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(ServiceError::OrderAlreadyUploaded) => StatusCode::OK.into_response(),
        Err(ServiceError::OrderOwnedByAnotherUser) => StatusCode::CONFLICT.into_response(),
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/orders
// ---------------------------------------------------------------------------

async fn list_orders(State(st): State<Arc<AppState>>, AuthUser(user_id): AuthUser) -> Response {
    match st.service.orders(user_id).await {
        Ok(orders) if orders.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(orders) => {
            let body: Vec<OrderResponse> = orders.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/balance
// ---------------------------------------------------------------------------

async fn balance(State(st): State<Arc<AppState>>, AuthUser(user_id): AuthUser) -> Response {
    match st.service.user_by_id(user_id).await {
        Ok(user) => (
            StatusCode::OK,
            Json(BalanceResponse {
                current: user.balance,
                withdrawn: user.withdrawn,
            }),
        )
            .into_response(),
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// POST /api/user/balance/withdraw
// ---------------------------------------------------------------------------

async fn withdraw(
    State(st): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: String,
) -> Response {
    let Ok(req) = serde_json::from_str::<WithdrawRequest>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(order_id) = req.order.trim().parse::<i64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if !luhn::is_valid(order_id) {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }

    match st.service.withdraw(user_id, order_id, req.sum).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(ServiceError::InsufficientFunds) => StatusCode::PAYMENT_REQUIRED.into_response(),
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/withdrawals
// ---------------------------------------------------------------------------

async fn list_withdrawals(
    State(st): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Response {
    match st.service.withdrawals(user_id).await {
        Ok(list) if list.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(list) => {
            let body: Vec<WithdrawalResponse> = list.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// GET /ping
// ---------------------------------------------------------------------------

async fn ping(State(st): State<Arc<AppState>>) -> Response {
    match st.service.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => internal(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 200 with a freshly signed token in the `Authorization` header.
fn authorized_ok(st: &AppState, user_id: i64) -> Response {
    match st.auth.generate_token(user_id) {
        Ok(token) => (StatusCode::OK, [(header::AUTHORIZATION, token)]).into_response(),
        Err(err) => internal(err.into()),
    }
}

fn internal(err: anyhow::Error) -> Response {
    error!(error = ?err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
