//! Background order status updater
//!
//! A periodic batch scheduler with a bounded worker pool. Each tick
//! fetches the oldest unprocessed orders and dispatches one worker per
//! order; the scheduler never waits for workers between ticks, so total
//! outbound concurrency is bounded by the semaphore and the accrual
//! client's rate limiter.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accrual::{AccrualApi, AccrualUpdate};
use crate::balance::Invalidator;
use crate::models::{Order, OrderStatus};
use crate::repositories::OrderRepo;

/// Updater tuning parameters
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Maximum number of concurrent workers
    pub parallel: usize,
    /// Maximum orders fetched per tick
    pub batch: i64,
    /// Tick period
    pub interval: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            parallel: 2,
            batch: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Periodic updater driving orders to a terminal status.
pub struct OrderUpdater {
    orders: Arc<dyn OrderRepo>,
    client: Arc<dyn AccrualApi>,
    invalidator: Arc<dyn Invalidator>,
    config: UpdaterConfig,
}

impl OrderUpdater {
    /// Create a new updater instance
    pub fn new(
        orders: Arc<dyn OrderRepo>,
        client: Arc<dyn AccrualApi>,
        invalidator: Arc<dyn Invalidator>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            orders,
            client,
            invalidator,
            config,
        }
    }

    /// Run ticks until `cancel` fires, then drain in-flight workers.
    pub async fn run(self, cancel: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.config.parallel));
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut workers: JoinSet<()> = JoinSet::new();

        info!(
            "Order updater started (parallel={}, batch={}, interval={:?})",
            self.config.parallel, self.config.batch, self.config.interval
        );

        'ticks: loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'ticks,
                _ = interval.tick() => {}
            }

            // Reap workers that finished since the previous tick.
            while workers.try_join_next().is_some() {}

            let orders = match self.orders.get_unprocessed(self.config.batch).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!("Failed to fetch unprocessed orders: {}", e);
                    continue;
                }
            };

            for order in orders {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => break 'ticks,
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'ticks,
                    },
                };

                let client = Arc::clone(&self.client);
                let orders = Arc::clone(&self.orders);
                let invalidator = Arc::clone(&self.invalidator);
                let cancel = cancel.clone();
                workers.spawn(async move {
                    // The permit is released on every exit path of the worker.
                    let _permit = permit;
                    process_order(order, client, orders, invalidator, cancel).await;
                });
            }
        }

        while workers.join_next().await.is_some() {}
        info!("Order updater stopped");
    }
}

/// Reconcile one order against the accrual service. Best-effort: any
/// failure leaves the order unprocessed for a later tick.
async fn process_order(
    order: Order,
    client: Arc<dyn AccrualApi>,
    orders: Arc<dyn OrderRepo>,
    invalidator: Arc<dyn Invalidator>,
    cancel: CancellationToken,
) {
    let update = match client.get(&order.number).await {
        Ok(update) => update,
        Err(e) => {
            debug!("Accrual lookup for order {} failed: {}", order.number, e);
            return;
        }
    };

    match update {
        AccrualUpdate::Throttled(delay) => {
            debug!("Accrual throttled, backing off for {:?}", delay);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
        AccrualUpdate::Unknown => {}
        AccrualUpdate::Ready { status, accrual } => {
            if let Err(e) = orders.update_status(&order.number, status, accrual).await {
                warn!("Failed to update order {}: {}", order.number, e);
                return;
            }
            if status == OrderStatus::Processed {
                invalidator.invalidate(order.user_id);
            }
        }
    }
}
