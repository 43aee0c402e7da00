//! `votepipe-server`: the HTTP ingest edge (§4.1–§4.3).

use std::net::SocketAddr;
use std::process::ExitCode;

use votepipe::app_builder;
use votepipe::config::Config;
use votepipe::http::server::build_router;
use votepipe::logging;
use votepipe::shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("info");
    tracing::info!(
        git_hash = env!("GIT_HASH"),
        build_date = env!("BUILD_DATE"),
        "votepipe-server starting"
    );

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let listen_addr: SocketAddr = match config.http.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid HTTP_LISTEN_ADDR");
            return ExitCode::FAILURE;
        }
    };
    let shutdown_drain = config.shutdown_drain;

    let context = match app_builder::build_server_context(config).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to assemble server context");
            return ExitCode::FAILURE;
        }
    };

    let router = build_router(context);

    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %listen_addr, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%listen_addr, "votepipe-server listening");

    let shutdown = ShutdownManager::new(shutdown_drain);
    let cancel = shutdown.token();
    tokio::spawn(shutdown.wait_for_shutdown());

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        cancel.cancelled().await;
    });

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "HTTP server exited with error");
    }

    ExitCode::SUCCESS
}
