//! Turns a decoded, signature-verified [`VoteMessage`] into a durable row
//! (§4.6). Consumes the identifier already resolved from the message's
//! token; authentication itself is the consumer's job.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::counters::CounterStore;
use crate::db;
use crate::models::VoteMessage;
use crate::retry::{retry_with_backoff, BackoffPolicy};

/// Retry shape for the materializer's transient-error loop (§4.6): three
/// to five attempts, 1s doubling to 10s, distinct from the broker's fixed
/// reconnect delay in `queue::connection_state`.
pub const DEFAULT_RETRY_POLICY: BackoffPolicy = BackoffPolicy::new(
    std::time::Duration::from_secs(1),
    std::time::Duration::from_secs(10),
    5,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The vote row was created and counters were incremented.
    Processed,
    /// `(user_id, candidate_id)` already had a row; the message is a
    /// harmless re-delivery and should still be acked.
    Duplicate,
}

/// Only the DB leg can fail the message back to the consumer (§7:
/// `CounterUnavailable on write → log and continue`); a counter-store
/// error after a successful commit is swallowed in [`VoteMaterializer::materialize`].
#[derive(thiserror::Error, Debug)]
pub enum MaterializeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct VoteMaterializer {
    pool: PgPool,
    counters: Arc<dyn CounterStore>,
    retry_policy: BackoffPolicy,
}

impl VoteMaterializer {
    pub fn new(pool: PgPool, counters: Arc<dyn CounterStore>, retry_policy: BackoffPolicy) -> Self {
        Self {
            pool,
            counters,
            retry_policy,
        }
    }

    /// Materialize one vote for the already-resolved `user_identifier`.
    /// The user-upsert and vote-insert run in a single transaction so a
    /// crash between them never leaves an orphaned user with no vote
    /// recorded against it.
    pub async fn materialize(
        &self,
        message: &VoteMessage,
        user_identifier: &str,
    ) -> Result<MaterializeOutcome, MaterializeError> {
        let inserted_id = retry_with_backoff(
            self.retry_policy,
            |attempt| {
                let pool = self.pool.clone();
                let message = message.clone();
                let user_identifier = user_identifier.to_string();
                async move {
                    if attempt > 1 {
                        tracing::info!(attempt, "retrying vote materialization");
                    }
                    materialize_once(&pool, &message, &user_identifier).await
                }
            },
            db::is_transient,
        )
        .await?;

        let outcome = match inserted_id {
            Some(_) => {
                // The DB transaction already committed; the vote is durable
                // regardless of what happens next. A counter-store hiccup
                // here must never fail the message back to the consumer —
                // log and move on, same as any other post-commit side
                // effect. The cache itself is left alone: it serves stale
                // totals until `RESULTS_CACHE_TTL_SECONDS` expires by design.
                if let Err(e) = self
                    .counters
                    .increment_candidate_votes(message.candidate_id)
                    .await
                {
                    tracing::warn!(
                        error = %e,
                        candidate_id = %message.candidate_id,
                        "counter increment failed after commit; vote is still durable"
                    );
                }
                MaterializeOutcome::Processed
            }
            None => {
                tracing::debug!(
                    candidate_id = %message.candidate_id,
                    user_identifier,
                    "duplicate vote ignored"
                );
                MaterializeOutcome::Duplicate
            }
        };

        Ok(outcome)
    }
}

async fn materialize_once(
    pool: &PgPool,
    message: &VoteMessage,
    user_identifier: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let user_id = db::upsert_user(&mut tx, user_identifier).await?;
    let inserted = db::insert_vote(
        &mut tx,
        user_id,
        message.candidate_id,
        message.vote_timestamp,
        &message.source_ip,
        &message.user_agent,
    )
    .await?;

    tx.commit().await?;
    Ok(inserted)
}
