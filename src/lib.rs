//! Vote intake-and-tally pipeline core.
//!
//! The crate is split along the data flow: `auth` verifies bearer tokens,
//! `queue` durably ferries vote submissions from the HTTP edge to the
//! `materializer`, which writes the system of record (`db`) and the
//! advisory `counters` store. `results` serves cache-first aggregates
//! back out. `http` wires the edge together; `reconciler` is the
//! background job that repairs counter drift.

pub mod app_builder;
pub mod app_context;
pub mod auth;
pub mod config;
pub mod counters;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod materializer;
pub mod models;
pub mod queue;
pub mod rate_limiter;
pub mod reconciler;
pub mod results;
pub mod retry;
pub mod shutdown;
