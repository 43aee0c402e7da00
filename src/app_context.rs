//! Shared application context assembled at startup by [`app_builder`] and
//! handed down to the HTTP handlers and worker tasks. Splitting it in two
//! mirrors the two binaries: the ingest server never needs a materializer,
//! and the worker never needs a rate limiter.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::counters::SharedCounterStore;
use crate::materializer::VoteMaterializer;
use crate::queue::consumer::VoteConsumer;
use crate::queue::publisher::VotePublisher;
use crate::rate_limiter::RateLimiter;
use crate::results::ResultsService;

/// Dependencies shared by the `votepipe-server` binary: everything the
/// HTTP handlers in `http::handlers` need to authenticate, rate-limit,
/// publish and serve results.
pub struct ServerContext {
    pub config: Config,
    pub counters: SharedCounterStore,
    pub rate_limiter: RateLimiter,
    pub publisher: Arc<VotePublisher>,
    pub results: ResultsService,
}

/// Dependencies shared by the `votepipe-worker` binary: the consumer loop
/// and the reconciliation job both read the same pool and counter store.
pub struct WorkerContext {
    pub config: Config,
    pub pool: PgPool,
    pub counters: SharedCounterStore,
    pub consumer: Arc<VoteConsumer>,
    pub materializer: Arc<VoteMaterializer>,
}
