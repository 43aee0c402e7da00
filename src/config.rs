//! Environment-driven configuration for both the ingest server and the worker.
//!
//! Every process-wide knob in §6 of the design doc is read here, once, at
//! startup, and handed down through a constructed [`Config`] rather than
//! read ad hoc from `std::env` at call sites.

use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub http: HttpConfig,
    pub rate_limit: RateLimitConfig,
    pub results_cache_ttl: Duration,
    pub reconcile_interval: Duration,
    pub shutdown_drain: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// `sqlx::PgPool` has no separate "overflow" tier; the two knobs are
    /// summed into a single hard cap on live connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub queue_name: String,
    pub dlx_exchange: String,
    pub dlq_queue: String,
    pub prefetch_count: u16,
    pub reconnect_delay: Duration,
    pub publish_retry_attempts: u32,
    pub publish_retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub threshold: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parse_env("DB_POOL_SIZE", 10)?,
                max_overflow: parse_env("DB_MAX_OVERFLOW", 20)?,
                acquire_timeout: Duration::from_secs(parse_env("DB_ACQUIRE_TIMEOUT_SECONDS", 30)?),
            },
            broker: BrokerConfig {
                url: required("RABBITMQ_URL")?,
                queue_name: required("RABBITMQ_QUEUE_NAME")?,
                dlx_exchange: env::var("RABBITMQ_DLX_EXCHANGE")
                    .unwrap_or_else(|_| "vote_dlx".to_string()),
                dlq_queue: env::var("RABBITMQ_DLQ_QUEUE")
                    .unwrap_or_else(|_| "vote_dlq".to_string()),
                prefetch_count: parse_env("QUEUE_PREFETCH_COUNT", 10)?,
                reconnect_delay: Duration::from_secs(parse_env(
                    "WORKER_RECONNECT_DELAY_SECONDS",
                    5,
                )?),
                publish_retry_attempts: parse_env("PUBLISH_RETRY_ATTEMPTS", 3)?,
                publish_retry_backoff: Duration::from_millis(parse_env(
                    "PUBLISH_RETRY_BACKOFF_MS",
                    1000,
                )?),
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET_KEY")?,
                algorithm: env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            },
            http: HttpConfig {
                listen_addr: env::var("HTTP_LISTEN_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW_SECONDS", 60)?),
                threshold: parse_env("RATE_LIMIT_THRESHOLD", 100)?,
            },
            results_cache_ttl: Duration::from_secs(parse_env("RESULTS_CACHE_TTL_SECONDS", 60)?),
            reconcile_interval: Duration::from_secs(parse_env(
                "RECONCILE_INTERVAL_SECONDS",
                300,
            )?),
            shutdown_drain: Duration::from_secs(parse_env("SHUTDOWN_DRAIN_SECONDS", 30)?),
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::Config(format!("{key} must be set")))
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_required_env() {
        env::set_var("DATABASE_URL", "postgres://localhost/votes");
        env::set_var("RABBITMQ_URL", "amqp://localhost");
        env::set_var("RABBITMQ_QUEUE_NAME", "votes");
        env::set_var("REDIS_URL", "redis://localhost");
        env::set_var("JWT_SECRET_KEY", "test-secret");
    }

    #[test]
    fn defaults_apply_when_unset() {
        set_required_env();
        env::remove_var("RESULTS_CACHE_TTL_SECONDS");
        env::remove_var("RATE_LIMIT_THRESHOLD");

        let config = Config::from_env().unwrap();
        assert_eq!(config.results_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.rate_limit.threshold, 100);
        assert_eq!(config.broker.dlx_exchange, "vote_dlx");
        assert_eq!(config.database.max_connections(), 30);
    }

    #[test]
    fn missing_required_var_is_a_config_error() {
        set_required_env();
        env::remove_var("DATABASE_URL");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        env::set_var("DATABASE_URL", "postgres://localhost/votes");
    }
}
