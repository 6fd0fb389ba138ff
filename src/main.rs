//! sbomvex - Main application entry point

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};

use sbomvex::{
    AppState, Config, create_router,
    infrastructure::{
        AdvisoryStore, DisabledAdvisoryStore, NvdClient, OpenAiClient, PostgresAdvisoryStore,
    },
    init_tracing,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        Config::default()
    });

    init_tracing(&config.logging)?;

    tracing::info!("Starting sbomvex server...");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        max_concurrent_lookups = config.pipeline.max_concurrent_lookups,
        "Configuration loaded"
    );

    let registry = Arc::new(NvdClient::from_config(&config.apis.nvd)?);
    if config.apis.nvd.api_key.is_none() {
        tracing::info!("NVD API key not provided; registry calls use the public rate limit");
    }

    let generator = Arc::new(OpenAiClient::from_config(&config.apis.generative)?);
    if config.apis.generative.api_key.is_none() {
        tracing::warn!(
            "Generative API key not provided; advisory fallback returns static guidance"
        );
    }

    let advisory_store: Arc<dyn AdvisoryStore> = match config.database.url.as_deref() {
        Some(url) => match PostgresAdvisoryStore::connect(url, &config.database).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "Advisory store unavailable, local retrieval disabled");
                Arc::new(DisabledAdvisoryStore)
            }
        },
        None => {
            tracing::info!("No database URL configured; local advisory retrieval disabled");
            Arc::new(DisabledAdvisoryStore)
        }
    };

    let app_state = AppState::new(&config, registry, advisory_store, generator);
    app_state.cache.clone().start_background_cleanup(Duration::from_secs(
        config.cache.cleanup_interval_seconds.max(1),
    ));
    let app = create_router(app_state, &config.server);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    tracing::info!("Server listening on {}", addr);
    if config.server.enable_docs {
        tracing::info!("API documentation available at http://{}/docs", addr);
    } else {
        tracing::info!("API documentation disabled (enable_docs=false)");
    }

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
