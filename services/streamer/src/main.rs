use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use streamer_service::config::ServiceConfig;
use streamer_service::{start_api_server, AppState, Config, DigitalHumanClient, ProfileStore};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        store = %config.store.streamer_config_path.display(),
        "Starting Streamer Service"
    );

    // Initialize metrics
    install_metrics_exporter(SocketAddr::from(([0, 0, 0, 0], config.service.metrics_port)))?;

    // Initialize components
    let store = Arc::new(
        ProfileStore::open(&config.store)
            .await
            .context("Failed to open streamer profile store")?,
    );

    let notifier = Arc::new(
        DigitalHumanClient::new(&config.digital_human)
            .context("Failed to initialize digital human client")?,
    );

    // Create API state
    let api_state = AppState {
        store,
        notifier,
        preprocess_user_id: config.digital_human.user_id.clone(),
        video_dir: config.streamer_video_dir(),
    };

    // The server drains in-flight requests once a signal arrives
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        start_api_server(api_state, &api_config, shutdown_signal()).await
    });

    info!("Streamer service started successfully");

    match api_handle.await {
        Ok(Ok(())) => {
            info!("Streamer service stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "API server error");
            Err(e)
        }
        Err(e) => Err(e).context("API server task panicked"),
    }
}

/// JSON logs; `RUST_LOG` wins over the configured level
fn init_tracing(service: &ServiceConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&service.log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_current_span(true)
        .init();
}

/// Serve Prometheus metrics on `addr`
fn install_metrics_exporter(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to install Prometheus metrics exporter on {addr}"))?;

    info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, draining requests");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, draining requests");
        }
    }
}
