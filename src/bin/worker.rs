//! `votepipe-worker`: the queue consumer and reconciliation job (§4.5–§4.8).

use std::process::ExitCode;

use votepipe::app_builder;
use votepipe::config::Config;
use votepipe::logging;
use votepipe::reconciler::Reconciler;
use votepipe::shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("info");
    tracing::info!(
        git_hash = env!("GIT_HASH"),
        build_date = env!("BUILD_DATE"),
        "votepipe-worker starting"
    );

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let reconcile_interval = config.reconcile_interval;
    let shutdown_drain = config.shutdown_drain;

    let context = match app_builder::build_worker_context(config).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to assemble worker context");
            return ExitCode::FAILURE;
        }
    };

    let mut shutdown = ShutdownManager::new(shutdown_drain);
    let cancel = shutdown.token();

    let consumer = context.consumer.clone();
    let consumer_cancel = cancel.clone();
    shutdown.register_task(tokio::spawn(async move {
        consumer.run(consumer_cancel).await;
    }));

    let reconciler = Reconciler::new(context.pool.clone(), context.counters.clone(), reconcile_interval);
    let reconciler_cancel = cancel.clone();
    shutdown.register_task(tokio::spawn(async move {
        reconciler.run(reconciler_cancel).await;
    }));

    tracing::info!("votepipe-worker started");
    shutdown.wait_for_shutdown().await;

    ExitCode::SUCCESS
}
