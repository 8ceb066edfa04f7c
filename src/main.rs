//! shopper-gateway server entry point.
//!
//! Connects to the broker, declares the topology, starts the queue consumer,
//! and serves the WebSocket and HTTP endpoints until SIGINT or SIGTERM.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use shopper_gateway::api;
use shopper_gateway::app_state::AppState;
use shopper_gateway::broker::{AmqpBroker, Broker, MemoryBroker};
use shopper_gateway::config::{GatewayConfig, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    init_tracing(config.log_format);
    tracing::info!(
        addr = %config.listen_addr,
        wire_format = %config.wire_format,
        "starting shopper-gateway"
    );

    // Connect to the broker
    let broker = connect_broker(&config).await?;
    broker
        .declare_topology(&config.broker.exchange, &config.broker.queue)
        .await
        .context("failed to declare broker topology")?;
    for topic in config.topics.all() {
        broker
            .declare_exchange(topic)
            .await
            .with_context(|| format!("failed to declare topic exchange {topic}"))?;
    }

    // Build application state and start broker consumption
    let app_state = AppState::new(Arc::clone(&broker), &config);
    if let Err(e) = app_state
        .start_consumer(broker.as_ref(), &config.broker.queue)
        .await
    {
        tracing::error!(queue = %config.broker.queue, error = %e, "failed to start broker consumer");
    }

    let registry = Arc::clone(&app_state.registry);
    let app = api::build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let stop = CancellationToken::new();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(stop.clone().cancelled_owned())
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            tracing::error!("server exited before shutdown was requested");
            joined.context("server task panicked")?.context("server error")?;
        }
        () = shutdown_signal() => {
            tracing::info!(
                connections = registry.len(),
                "shutdown signal received, closing connections"
            );
            // Open sockets keep the server alive until their loops end.
            registry.for_each(|conn| conn.close());
            stop.cancel();

            match tokio::time::timeout(config.shutdown_grace, &mut server).await {
                Ok(joined) => joined.context("server task panicked")?.context("server error")?,
                Err(_) => {
                    tracing::warn!(grace = ?config.shutdown_grace, "shutdown grace period elapsed");
                    server.abort();
                }
            }
        }
    }

    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "failed to close broker connection cleanly");
    }
    tracing::info!("shopper-gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn connect_broker(config: &GatewayConfig) -> anyhow::Result<Arc<dyn Broker>> {
    if config.uses_memory_broker() {
        tracing::warn!("using in-process broker; events will not leave this process");
        return Ok(Arc::new(MemoryBroker::new()));
    }
    let broker = AmqpBroker::connect(&config.broker.url)
        .await
        .context("failed to connect to broker")?;
    Ok(Arc::new(broker))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
