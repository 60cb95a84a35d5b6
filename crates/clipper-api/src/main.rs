//! Clipper API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipper_api::{create_router, metrics, ApiConfig, AppState};
use clipper_media::check_tool;
use clipper_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = config.use_json_logs(std::env::var("LOG_FORMAT").ok().as_deref());

    let env_filter = EnvFilter::from_default_env().add_directive("clipper=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting clipper-api");

    let worker = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, base_url={}, environment={}",
        config.host, config.port, config.base_url, config.environment
    );
    info!(
        "Worker config: slots={}, queue={}, dir={}, ttl={:?}",
        worker.effective_capacity(),
        worker.max_queued_jobs,
        worker.download_dir.display(),
        worker.effective_ttl()
    );

    for program in [&worker.fetch_program, &worker.trim_program] {
        match check_tool(program) {
            Ok(path) => info!("Found {} at {}", program, path.display()),
            Err(e) => warn!("{}; jobs will fail until it is installed", e),
        }
    }

    tokio::fs::create_dir_all(&worker.download_dir)
        .await
        .with_context(|| format!("Failed to create {}", worker.download_dir.display()))?;

    let shutdown_timeout = worker.shutdown_timeout;
    let state = AppState::new(config.clone(), worker);
    // Links handed out before a restart stay valid until their TTL.
    state.publisher.restore().await;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    // Start retention background task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retention = tokio::spawn(state.retention_service().run(shutdown_rx));

    let dispatcher = std::sync::Arc::clone(&state.dispatcher);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown({
            let dispatcher = std::sync::Arc::clone(&dispatcher);
            async move {
                shutdown_signal().await;
                // Refuse new submissions while open requests finish.
                dispatcher.close();
            }
        })
        .await
        .context("Server error")?;

    info!("Waiting for in-flight jobs to complete...");
    if !dispatcher.drain(shutdown_timeout).await {
        warn!("Shutdown timeout reached with jobs still running");
    }

    let _ = shutdown_tx.send(true);
    let _ = retention.await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}
