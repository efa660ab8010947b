//! wsgw Binary
//!
//! This is the main entry point for the gateway. It initializes tracing and
//! metrics, and starts the service with configuration from command-line
//! arguments or environment variables. `-v`/`--version` prints build info
//! and exits.

use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use eyre::Context as _;
use tokio_util::sync::CancellationToken;
use wsgw_service::{
    GatewayBuilder,
    config::GatewayConfig,
    services::directory::{DirectoryService, redis::RedisDirectory},
};

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    if std::env::args()
        .skip(1)
        .any(|arg| arg == "-v" || arg == "--version")
    {
        println!("{}", wsgw_service::version_info());
        return Ok(ExitCode::SUCCESS);
    }

    wsgw_service::logging::install_tracing();
    wsgw_service::metrics::describe_metrics();
    tracing::info!("{}", wsgw_service::version_info());

    let config = GatewayConfig::parse();
    tracing::info!("starting wsgw with config: {config:#?}");

    let directory: Option<DirectoryService> = match config.redis_host.as_deref() {
        Some(host) if !host.is_empty() => Some(Arc::new(
            RedisDirectory::connect(host, config.redis_port)
                .await
                .context("while connecting to the ownership directory")?,
        )),
        _ => None,
    };

    let (cancellation_token, is_graceful_shutdown) = spawn_shutdown_task();

    // Clone the values we need afterwards as well
    let bind_addr = config.bind_addr;
    let max_wait_time_shutdown = config.max_wait_time_shutdown;

    let router = GatewayBuilder::init(config, directory, cancellation_token.clone())
        .context("while initiating gateway service")?
        .build();

    tracing::info!("binding to {bind_addr}");
    let tcp_listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("while binding tcp-listener")?;

    let axum_cancel_token = cancellation_token.clone();
    let server = tokio::spawn(async move {
        tracing::info!(
            "starting axum server on {}",
            tcp_listener
                .local_addr()
                .map(|x| x.to_string())
                .unwrap_or(String::from("invalid addr"))
        );
        let axum_shutdown_signal = axum_cancel_token.clone();
        let axum_result = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move { axum_shutdown_signal.cancelled().await })
            .await;
        tracing::info!("axum server shutdown");
        if let Err(err) = axum_result {
            tracing::error!("got error from axum: {err:?}");
        }
        // we cancel the token in case axum encountered an error to shutdown the service
        axum_cancel_token.cancel();
    });

    tracing::info!("everything started successfully - now waiting for shutdown...");
    cancellation_token.cancelled().await;

    tracing::info!("waiting for shutdown of services (max wait time {max_wait_time_shutdown:?})..");
    match tokio::time::timeout(max_wait_time_shutdown, server).await {
        Ok(_) => tracing::info!("successfully finished shutdown in time"),
        Err(_) => tracing::warn!("could not finish shutdown in time"),
    }

    if is_graceful_shutdown.load(Ordering::Relaxed) {
        tracing::info!("good night!");
        Ok(ExitCode::SUCCESS)
    } else {
        // we don't want to double print the error therefore we just return FAILURE
        tracing::error!("unexpected shutdown - check error logs");
        Ok(ExitCode::FAILURE)
    }
}

/// Spawns the task that turns a termination signal into a cancellation.
///
/// The returned flag records whether the cancellation came from a signal
/// (graceful) or from a failing service.
fn spawn_shutdown_task() -> (CancellationToken, Arc<AtomicBool>) {
    let cancellation_token = CancellationToken::new();
    let is_graceful_shutdown = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        let is_graceful_shutdown = Arc::clone(&is_graceful_shutdown);
        async move {
            shutdown_signal().await;
            is_graceful_shutdown.store(true, Ordering::Relaxed);
            cancellation_token.cancel();
        }
    });
    (cancellation_token, is_graceful_shutdown)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut hangup = signal(SignalKind::hangup()).expect("can install SIGHUP handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("can install SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("can install SIGTERM handler");
    let mut quit = signal(SignalKind::quit()).expect("can install SIGQUIT handler");
    tokio::select! {
        _ = hangup.recv() => tracing::info!("caught SIGHUP, stopping server..."),
        _ = interrupt.recv() => tracing::info!("caught SIGINT, stopping server..."),
        _ = terminate.recv() => tracing::info!("caught SIGTERM, stopping server..."),
        _ = quit.recv() => tracing::info!("caught SIGQUIT, stopping server..."),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("caught ctrl-c, stopping server...");
}
