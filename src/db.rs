//! System-of-record access: connection pool setup and the statements the
//! materializer and results service run against Postgres (§4.6, §4.7).

use std::collections::HashMap;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::Candidate;

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections())
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
}

/// Insert-or-fetch the user for `user_identifier` inside an open
/// transaction. The dummy `DO UPDATE` is required so `RETURNING` yields
/// the existing row's id on conflict (§4.6 step 1).
pub async fn upsert_user(
    tx: &mut Transaction<'_, Postgres>,
    user_identifier: &str,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO users (id, user_identifier) VALUES ($1, $2) \
         ON CONFLICT (user_identifier) DO UPDATE SET user_identifier = excluded.user_identifier \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(user_identifier)
    .fetch_one(&mut **tx)
    .await
}

/// Insert the vote, letting the uniqueness constraint silently absorb
/// duplicates. Returns `Some(id)` when this call actually created the
/// row, `None` when an existing `(user_id, candidate_id)` row already
/// claimed the slot (§4.6 step 2).
pub async fn insert_vote(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    candidate_id: Uuid,
    vote_timestamp: chrono::DateTime<chrono::Utc>,
    source_ip: &str,
    user_agent: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO votes \
            (id, user_id, candidate_id, vote_timestamp, source_ip, user_agent, is_valid, processing_status) \
         VALUES ($1, $2, $3, $4, $5, $6, true, 'processed') \
         ON CONFLICT ON CONSTRAINT uq_votes_user_candidate DO NOTHING \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(candidate_id)
    .bind(vote_timestamp)
    .bind(source_ip)
    .bind(user_agent)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn fetch_candidates_by_id(
    pool: &PgPool,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Candidate>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Candidate> = sqlx::query_as(
        "SELECT id, name, description, created_at FROM candidates WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|c| (c.id, c)).collect())
}

/// Authoritative vote counts per candidate, used by the reconciliation
/// job (§4.8) to repair counter-store drift.
pub async fn count_votes_by_candidate(pool: &PgPool) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    let rows: Vec<(Uuid, i64)> =
        sqlx::query_as("SELECT candidate_id, COUNT(*) FROM votes GROUP BY candidate_id")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().collect())
}

/// Classify a `sqlx::Error` as transient (worth retrying, §4.6 retry
/// policy) or persistent (a programming/data problem that should
/// propagate straight to DLQ routing). Connection drops, pool timeouts
/// and Postgres error codes for serialization failures (`40001`) and
/// deadlocks (`40P01`) are transient; everything else — including
/// integrity violations other than the handled `ON CONFLICT` — is not.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some("40001") | Some("40P01") | Some("08000") | Some("08003") | Some("08006")
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn row_not_found_is_not_transient() {
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn configuration_error_is_not_transient() {
        let err = sqlx::Error::Configuration("bad config".into());
        assert!(!is_transient(&err));
    }
}
