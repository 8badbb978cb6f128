//! Wire shapes.  Success bodies are JSON; error responses carry an empty or
//! plain-text body, so there are no error structs here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_db::{Order, Withdrawal};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub number: i64,
    pub status: &'static str,
    /// Present only for orders that actually earned points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            number: order.id,
            status: order.status.as_str(),
            accrual: order.accrual.filter(|a| *a > 0.0),
            uploaded_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub current: f64,
    pub withdrawn: f64,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    /// Order number as a decimal string.
    pub order: String,
    pub sum: f64,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: f64,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        Self {
            order: w.order_id.to_string(),
            sum: w.sum,
            processed_at: w.created_at,
        }
    }
}
