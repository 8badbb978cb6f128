//! Periodic accrual synchronisation.
//!
//! Every `frequency` the job runs one *round*: a producer reads all orders
//! still in NEW or PROCESSING, a bounded pool of workers asks the accrual
//! service about each of them, and a single applier folds the reports back
//! into the database one transaction per order.  Rounds never overlap (the
//! next tick is consumed only after the current round finishes) and no
//! failure inside a round escapes it: a broken order is logged and retried on
//! a later tick because it simply stays unfinished.
//!
//! Lock order inside the applier is order-row then user-row.  The withdrawal
//! path locks only the user row, so the two cannot deadlock.

use std::time::Duration;

use anyhow::Context as _;
use futures_util::StreamExt;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tally_accrual::{Client, OrderUpdate, ReportStatus};
use tally_db::{store, OrderStatus, StoreError};

pub struct SyncJob {
    pool: PgPool,
    client: Client,
    frequency: Duration,
    rate_limit: usize,
}

impl SyncJob {
    pub fn new(pool: PgPool, client: Client, frequency: Duration, rate_limit: usize) -> Self {
        Self {
            pool,
            client,
            frequency,
            rate_limit: rate_limit.max(1),
        }
    }

    /// Tick loop.  Returns only when `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.frequency,
            self.frequency,
        );
        // A round that outlives its tick swallows the missed ticks instead of
        // stacking extra rounds behind it.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut round = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("accrual sync stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            round += 1;
            debug!(round, "accrual sync round");
            if let Err(err) = self.run_round(&cancel).await {
                warn!(round, error = %err, "accrual sync round failed");
            }
        }
    }

    /// One producer → workers → applier pass over the unfinished orders.
    ///
    /// Public so tests (and operational tooling) can drive a round without
    /// waiting for the timer.
    pub async fn run_round(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        // Producer: snapshot the unfinished set in its own transaction.
        let orders = {
            let mut tx = self.pool.begin().await.context("begin producer transaction")?;
            let orders = store::unfinished_orders(&mut tx)
                .await
                .context("read unfinished orders")?;
            tx.commit().await.context("commit producer transaction")?;
            orders
        };

        if orders.is_empty() {
            return Ok(());
        }
        debug!(count = orders.len(), "orders awaiting accrual");

        // Workers: bounded fan-out to the accrual service.  A client error
        // only costs this round; the order stays unfinished and is retried.
        let (report_tx, mut report_rx) = mpsc::channel::<OrderUpdate>(orders.len());
        let fanout = {
            let client = self.client.clone();
            let cancel = cancel.clone();
            let rate_limit = self.rate_limit;
            tokio::spawn(async move {
                futures_util::stream::iter(orders)
                    .for_each_concurrent(rate_limit, |order| {
                        let client = client.clone();
                        let report_tx = report_tx.clone();
                        let cancel = cancel.clone();
                        async move {
                            if cancel.is_cancelled() {
                                return;
                            }
                            match client.order_status(order.id).await {
                                Ok(report) => {
                                    let _ = report_tx.send(report).await;
                                }
                                Err(err) => {
                                    debug!(order_id = order.id, error = %err, "order skipped this round");
                                }
                            }
                        }
                    })
                    .await;
                // Dropping the last sender here closes the reports channel.
            })
        };

        // Applier: single consumer, one transaction per report.
        while let Some(report) = report_rx.recv().await {
            if let Err(err) = apply_report(&self.pool, &report).await {
                warn!(order_id = report.order, error = %err, "failed to apply accrual report");
            }
        }

        fanout.await.context("worker fan-out panicked")?;
        Ok(())
    }
}

/// Apply one accrual report: update the order and credit the owner.
///
/// The order row is re-read under FOR UPDATE and skipped when it is already
/// terminal.  The upstream scan excludes terminal orders, but this check is
/// what makes a racing or replayed report unable to credit twice.
pub async fn apply_report(pool: &PgPool, report: &OrderUpdate) -> anyhow::Result<()> {
    let mut tx = pool.begin().await.context("begin apply transaction")?;

    let order = match store::order_by_id(&mut tx, report.order, true).await {
        Ok(order) => order,
        Err(StoreError::NotFound) => {
            // A report for an order we never stored; nothing to apply.
            tx.rollback().await?;
            return Ok(());
        }
        Err(err) => return Err(err).context("lock order row"),
    };

    if order.status.is_terminal() {
        tx.rollback().await?;
        debug!(order_id = order.id, status = order.status.as_str(), "order already settled");
        return Ok(());
    }

    let user = store::user_by_id(&mut tx, order.user_id, true)
        .await
        .context("lock user row")?;

    let status = order_status_for(report.status);
    let accrual = (status == OrderStatus::Processed).then_some(report.accrual);
    store::update_order(&mut tx, order.id, accrual, status)
        .await
        .context("update order")?;

    if report.accrual > 0.0 {
        store::update_user_balance(&mut tx, user.id, user.balance + report.accrual, user.withdrawn)
            .await
            .context("credit user balance")?;
    }

    tx.commit().await.context("commit apply transaction")?;
    Ok(())
}

/// REGISTERED means the accrual service has seen the order but not started on
/// it; from our side that is still NEW.
fn order_status_for(status: ReportStatus) -> OrderStatus {
    match status {
        ReportStatus::Registered => OrderStatus::New,
        ReportStatus::Processing => OrderStatus::Processing,
        ReportStatus::Invalid => OrderStatus::Invalid,
        ReportStatus::Processed => OrderStatus::Processed,
    }
}
