//! Client for the external accrual service.
//!
//! One endpoint: `GET <base>/api/orders/<number>`.  The interesting part is
//! the 429 handling: the service answers with `Retry-After: <seconds>` and
//! expects callers to back off.  The client gates itself with a single atomic
//! availability flag: while closed, every call fails fast with
//! [`AccrualError::Unavailable`] without touching the network, and one spawned
//! timer reopens the flag once the window elapses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Processing state reported by the accrual service.
///
/// REGISTERED is an accrual-side notion only; the sync job folds it back into
/// NEW before persisting anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// One accrual report.  The service serialises the order number as a decimal
/// string and omits `accrual` for orders that earned nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdate {
    #[serde(deserialize_with = "decimal_string")]
    pub order: i64,
    pub status: ReportStatus,
    #[serde(default)]
    pub accrual: f64,
}

fn decimal_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AccrualError {
    /// 204: the order is not registered with the accrual service (yet).
    #[error("order is not known to the accrual service")]
    NoContent,
    /// 429: the service asked us to back off.
    #[error("accrual service is rate limiting")]
    TooManyRequests,
    /// The client is inside a Retry-After window; no request was made.
    #[error("accrual client closed for the retry window")]
    Unavailable,
    /// 200 with a body we refuse: decode failure or an unknown status.
    #[error("invalid accrual payload: {0}")]
    InvalidPayload(String),
    #[error("unexpected accrual response status {0}")]
    UnexpectedStatus(u16),
    #[error("accrual request failed")]
    Transport(#[source] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle; all clones share the availability flag, so one
/// worker hitting a 429 closes the client for the whole pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    available: Arc<AtomicBool>,
}

impl Client {
    /// `addr` may be a bare `host:port`; it is normalised to `http://`.
    pub fn new(addr: &str) -> Self {
        let base_url = if addr.starts_with("http") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };

        Self {
            http: reqwest::Client::new(),
            base_url,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the accrual report for one order.
    ///
    /// The returned future aborts the in-flight request when dropped, so the
    /// caller's cancellation propagates for free.
    pub async fn order_status(&self, number: i64) -> Result<OrderUpdate, AccrualError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(AccrualError::Unavailable);
        }

        let url = format!("{}/api/orders/{}", self.base_url, number);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(AccrualError::Transport)?;

        match resp.status() {
            StatusCode::OK => {
                let update: OrderUpdate = resp
                    .json()
                    .await
                    .map_err(|err| AccrualError::InvalidPayload(err.to_string()))?;
                debug!(order = update.order, status = ?update.status, "accrual report");
                Ok(update)
            }
            StatusCode::NO_CONTENT => Err(AccrualError::NoContent),
            StatusCode::TOO_MANY_REQUESTS => {
                match retry_after_seconds(&resp) {
                    Some(secs) => self.close_for(Duration::from_secs(secs)),
                    // No usable header: report the pushback but stay open.
                    None => warn!("429 without a parsable Retry-After header"),
                }
                Err(AccrualError::TooManyRequests)
            }
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }

    /// Close the availability flag and arm a single reopen timer.
    ///
    /// The swap guard means concurrent 429s do not stack timers: whoever
    /// flips the flag first owns the reopen, and while closed no call reaches
    /// the network to observe a newer Retry-After.
    fn close_for(&self, window: Duration) {
        if self.available.swap(false, Ordering::AcqRel) {
            debug!(?window, "accrual client closed");
            let available = Arc::clone(&self.available);
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                available.store(true, Ordering::Release);
                debug!("accrual client reopened");
            });
        }
    }
}

fn retry_after_seconds(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
