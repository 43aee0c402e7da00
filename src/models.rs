//! Wire and storage types for the core entities (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_processing_status", rename_all = "lowercase")]
pub enum ProcessingStatus {
    Received,
    Validating,
    Processed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub user_identifier: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub vote_timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub user_agent: String,
    pub is_valid: bool,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
}

/// Transient message carried on the durable queue between ingest and the
/// materializer. `user_token` is re-verified (signature only, expiry
/// ignored) by the consumer to derive `user_identifier` — see the
/// payload-vs-header note in the design doc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub candidate_id: Uuid,
    pub user_token: String,
    pub vote_timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateResult {
    pub candidate_id: Uuid,
    pub name: String,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub results: Vec<CandidateResult>,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_message_round_trips_through_json() {
        let msg = VoteMessage {
            candidate_id: Uuid::new_v4(),
            user_token: "abc.def.ghi".to_string(),
            vote_timestamp: Utc::now(),
            source_ip: "203.0.113.7".to_string(),
            user_agent: "test-agent/1.0".to_string(),
        };

        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: VoteMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }
}
