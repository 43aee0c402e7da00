//! Wires a [`Config`] into the shared contexts the two binaries run
//! against: database pool, counter store, publisher, consumer and
//! materializer all get assembled here rather than inline in `main`.

use std::sync::Arc;

use crate::app_context::{ServerContext, WorkerContext};
use crate::config::Config;
use crate::counters::RedisCounterStore;
use crate::db;
use crate::error::AppError;
use crate::materializer::{VoteMaterializer, DEFAULT_RETRY_POLICY};
use crate::queue::consumer::VoteConsumer;
use crate::queue::publisher::VotePublisher;
use crate::rate_limiter::RateLimiter;
use crate::results::ResultsService;

pub async fn build_server_context(config: Config) -> Result<ServerContext, AppError> {
    let pool = db::connect(&config.database)
        .await
        .map_err(AppError::Database)?;

    let counters = Arc::new(
        RedisCounterStore::connect(&config.redis.url)
            .await
            .map_err(|e| AppError::CounterUnavailable(e.to_string()))?,
    );

    let rate_limiter = RateLimiter::new(
        counters.clone(),
        config.rate_limit.window,
        config.rate_limit.threshold,
    );

    let publisher = Arc::new(VotePublisher::new(config.broker.clone()));
    publisher
        .connect()
        .await
        .map_err(|e| AppError::PublishUnavailable(e.to_string()))?;

    let results = ResultsService::new(pool, counters.clone(), config.results_cache_ttl);

    Ok(ServerContext {
        config,
        counters,
        rate_limiter,
        publisher,
        results,
    })
}

pub async fn build_worker_context(config: Config) -> Result<WorkerContext, AppError> {
    let pool = db::connect(&config.database)
        .await
        .map_err(AppError::Database)?;

    let counters = Arc::new(
        RedisCounterStore::connect(&config.redis.url)
            .await
            .map_err(|e| AppError::CounterUnavailable(e.to_string()))?,
    );

    let materializer = Arc::new(VoteMaterializer::new(
        pool.clone(),
        counters.clone(),
        DEFAULT_RETRY_POLICY,
    ));

    let consumer = Arc::new(VoteConsumer::new(
        config.broker.clone(),
        config.jwt.clone(),
        materializer.clone(),
    ));

    Ok(WorkerContext {
        config,
        pool,
        counters,
        consumer,
        materializer,
    })
}
