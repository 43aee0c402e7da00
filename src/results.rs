//! Cache-first results service backing `GET /api/v1/results` (§4.7).
//!
//! Every query shape tries the cached full list first and filters/sorts/
//! paginates it in memory; only a cache MISS hits the counter store and
//! database directly, and only a query whose result is worth caching in
//! full (unfiltered, first page, large limit — the heuristic below)
//! repopulates the cache afterward.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::counters::CounterStore;
use crate::db;
use crate::models::{CandidateResult, ResultsResponse};

const CACHE_WORTHY_LIMIT: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct ResultsQuery {
    pub candidate_id: Option<Uuid>,
    pub page: usize,
    pub limit: usize,
}

impl ResultsQuery {
    /// §4.7 heuristic: only an unfiltered first page asking for more than
    /// the cache-worthy threshold is worth caching in full.
    fn worth_caching(&self) -> bool {
        self.candidate_id.is_none() && self.page <= 1 && self.limit > CACHE_WORTHY_LIMIT
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("counter store error: {0}")]
    Counter(#[from] crate::counters::CounterError),
}

pub struct ResultsService {
    pool: PgPool,
    counters: Arc<dyn CounterStore>,
    cache_ttl: Duration,
}

impl ResultsService {
    pub fn new(pool: PgPool, counters: Arc<dyn CounterStore>, cache_ttl: Duration) -> Self {
        Self {
            pool,
            counters,
            cache_ttl,
        }
    }

    pub async fn fetch(&self, query: &ResultsQuery) -> Result<ResultsResponse, ResultsError> {
        if let Some(cached) = self.counters.get_results_cache().await? {
            return Ok(apply_query(cached, query));
        }

        let full = self.rebuild().await?;

        if query.worth_caching() {
            self.counters.set_results_cache(&full, self.cache_ttl).await?;
        }

        Ok(apply_query(full, query))
    }

    /// Recompute the full, sorted result set straight from the counter
    /// hash and the candidate table, bypassing the cache entirely.
    async fn rebuild(&self) -> Result<ResultsResponse, ResultsError> {
        let votes = self.counters.get_candidate_votes().await?;
        let candidate_ids: Vec<Uuid> = votes.keys().copied().collect();
        let candidates = db::fetch_candidates_by_id(&self.pool, &candidate_ids).await?;

        let mut results: Vec<CandidateResult> = votes
            .into_iter()
            .filter_map(|(id, count)| {
                candidates.get(&id).map(|c| CandidateResult {
                    candidate_id: id,
                    name: c.name.clone(),
                    vote_count: count,
                })
            })
            .collect();

        results.sort_by(|a, b| b.vote_count.cmp(&a.vote_count).then(a.name.cmp(&b.name)));

        Ok(ResultsResponse {
            results,
            last_updated: chrono::Utc::now(),
        })
    }
}

fn apply_query(mut response: ResultsResponse, query: &ResultsQuery) -> ResultsResponse {
    if let Some(candidate_id) = query.candidate_id {
        response.results.retain(|r| r.candidate_id == candidate_id);
        return response;
    }

    let page = query.page.max(1);
    let limit = query.limit.max(1);
    let start = (page - 1) * limit;

    response.results = response.results.into_iter().skip(start).take(limit).collect();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultsResponse {
        ResultsResponse {
            results: vec![
                CandidateResult {
                    candidate_id: Uuid::new_v4(),
                    name: "Alice".into(),
                    vote_count: 10,
                },
                CandidateResult {
                    candidate_id: Uuid::new_v4(),
                    name: "Bob".into(),
                    vote_count: 5,
                },
                CandidateResult {
                    candidate_id: Uuid::new_v4(),
                    name: "Carol".into(),
                    vote_count: 1,
                },
            ],
            last_updated: chrono::Utc::now(),
        }
    }

    #[test]
    fn filters_by_candidate_id_when_present() {
        let data = sample();
        let target = data.results[1].candidate_id;
        let filtered = apply_query(
            data,
            &ResultsQuery {
                candidate_id: Some(target),
                page: 1,
                limit: 50,
            },
        );
        assert_eq!(filtered.results.len(), 1);
        assert_eq!(filtered.results[0].candidate_id, target);
    }

    #[test]
    fn paginates_when_no_filter() {
        let data = sample();
        let page = apply_query(
            data,
            &ResultsQuery {
                candidate_id: None,
                page: 2,
                limit: 1,
            },
        );
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "Bob");
    }

    #[test]
    fn pages_concatenate_to_the_full_sorted_list() {
        let data = sample();
        let mut seen = Vec::new();
        for page in 1..=3 {
            let slice = apply_query(
                data.clone(),
                &ResultsQuery {
                    candidate_id: None,
                    page,
                    limit: 1,
                },
            );
            seen.extend(slice.results);
        }
        assert_eq!(seen, data.results);
    }

    #[test]
    fn worth_caching_heuristic() {
        assert!(ResultsQuery {
            candidate_id: None,
            page: 1,
            limit: 200,
        }
        .worth_caching());

        assert!(!ResultsQuery {
            candidate_id: None,
            page: 1,
            limit: 50,
        }
        .worth_caching());

        assert!(!ResultsQuery {
            candidate_id: Some(Uuid::new_v4()),
            page: 1,
            limit: 200,
        }
        .worth_caching());

        assert!(!ResultsQuery {
            candidate_id: None,
            page: 2,
            limit: 200,
        }
        .worth_caching());
    }
}
