use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aurum_events::{EnvSecrets, HttpTransport, OutboundRelay, TokioScheduler};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aurum_api::background;
use aurum_api::config::ServerConfig;
use aurum_api::router::build_app_router;
use aurum_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "aurum_api=debug,aurum_events=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = Arc::new(ServerConfig::from_env());
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database (optional) ---
    let pool = match &config.database_url {
        Some(database_url) => {
            let pool = aurum_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            aurum_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            aurum_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");
            Some(pool)
        }
        None => {
            tracing::info!("DATABASE_URL not set, inbound events are kept in memory only");
            None
        }
    };

    // --- App state ---
    let cancel = CancellationToken::new();
    let transport = HttpTransport::new(Duration::from_secs(config.delivery_timeout_secs))
        .expect("Failed to build outbound HTTP client");
    let state = AppState::new(
        Arc::clone(&config),
        pool,
        Arc::new(transport),
        Arc::new(TokioScheduler::new(cancel.clone())),
        Arc::new(EnvSecrets),
    );

    match state.inbound.hydrate(Utc::now()).await {
        Ok(loaded) if loaded > 0 => tracing::info!(loaded, "Inbound log restored from database"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Failed to restore inbound log"),
    }

    // --- Background services ---
    let relay_handle = {
        let engine = state.delivery.clone();
        let receiver = state.event_bus.subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => tracing::info!("Outbound relay stopping"),
                _ = OutboundRelay::run(engine, receiver) => {}
            }
        })
    };
    let retention_handle = tokio::spawn(background::inbound_retention::run(
        Arc::clone(&state.inbound),
        background::inbound_retention::PRUNE_INTERVAL,
        cancel.clone(),
    ));
    let sweep_handle = tokio::spawn(background::idempotency_sweep::run(
        Arc::clone(&state.idempotency),
        background::idempotency_sweep::SWEEP_INTERVAL,
        cancel.clone(),
    ));
    tracing::info!("Background services started (relay, inbound retention, idempotency sweep)");

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stops background jobs and drops pending sandbox confirmations.
    cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs.min(5));
    let _ = tokio::time::timeout(drain, relay_handle).await;
    let _ = tokio::time::timeout(drain, retention_handle).await;
    let _ = tokio::time::timeout(drain, sweep_handle).await;
    tracing::info!("Background services stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix) to start a graceful
/// shutdown.
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
