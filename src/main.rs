use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use echome::app_state::AppState;
use echome::auth::SessionVerifier;
use echome::config::AppConfig;
use echome::db::{self, queries::PgStore};
use echome::routes;
use echome::services::{
    dispatch, queue::RedisQueue, speech::SpeechClient, storage::ArtifactStore,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing echome server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Connecting to Redis job queue");
    let queue = RedisQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    if config.elevenlabs_api_key.is_none() {
        tracing::warn!("ELEVENLABS_API_KEY not set; speech synthesis will be unavailable");
    }
    let speech = SpeechClient::new(
        &config.elevenlabs_base_url,
        config.elevenlabs_api_key.clone(),
        config.speech_timeout(),
    )
    .expect("Failed to initialize speech client");

    let state = AppState::new(
        Arc::new(PgStore::new(db_pool)),
        Arc::new(queue),
        speech,
        ArtifactStore::new(config.data_dir.clone()),
        SessionVerifier::new(&config.session_secret),
    );

    // Outbox relay, stopped once the server has drained
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = tokio::spawn(dispatch::run_relay(
        state.clone(),
        config.dispatch_interval(),
        shutdown_rx,
    ));

    let app = routes::build_router(state, config.max_upload_bytes, Some(prometheus_handle));

    tracing::info!("Starting echome on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = relay.await {
        tracing::error!(error = %e, "Outbox relay task panicked");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
