//! Background job that recomputes candidate vote counts from Postgres and
//! overwrites the Redis hash field-by-field (§4.8). The counter store is
//! advisory; this is what bounds how far it can drift from the system of
//! record.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::counters::CounterStore;
use crate::db;

pub struct Reconciler {
    pool: PgPool,
    counters: Arc<dyn CounterStore>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(pool: PgPool, counters: Arc<dyn CounterStore>, interval: Duration) -> Self {
        Self {
            pool,
            counters,
            interval,
        }
    }

    /// Run until `cancel` fires, reconciling once per tick. A failed tick
    /// is logged and skipped; it does not stop the loop, since the next
    /// tick will simply try again (§4.8: "errors logged, not fatal").
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // first tick fires immediately; skip it, wait a full interval

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("reconciliation loop stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        tracing::error!(error = %e, "reconciliation pass failed");
                    }
                }
            }
        }
    }

    pub async fn reconcile_once(&self) -> Result<(), sqlx::Error> {
        let authoritative = db::count_votes_by_candidate(&self.pool).await?;
        let mut updated = 0usize;

        for (candidate_id, count) in &authoritative {
            if let Err(e) = self.counters.set_candidate_votes(*candidate_id, *count).await {
                tracing::error!(error = %e, %candidate_id, "failed to reconcile candidate counter");
                continue;
            }
            updated += 1;
        }

        tracing::debug!(candidates = updated, "reconciliation pass complete");
        Ok(())
    }
}
