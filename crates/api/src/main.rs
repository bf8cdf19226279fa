use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crowdship_api::background::session_cleanup::{self, CleanupSchedule};
use crowdship_api::config::ServerConfig;
use crowdship_api::rate_limit::counter::{CounterStore, MemoryCounterStore, RedisCounterStore};
use crowdship_api::router::build_app_router;
use crowdship_api::state::AppState;
use crowdship_db::Stores;
use crowdship_events::{EmailConfig, LogNotifier, Notifier, SmtpNotifier};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crowdship_api=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        app_env = ?config.app_env,
        fail_open = config.rate_limit.fail_open,
        "Loaded server configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = crowdship_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    crowdship_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    crowdship_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let stores = Stores::postgres(pool.clone());

    // --- Throttle counters ---
    let counters: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisCounterStore::connect(url)
                .await
                .expect("Failed to connect to Redis");
            tracing::info!("Throttle counters backed by Redis");
            Arc::new(store)
        }
        None => {
            tracing::info!("REDIS_URL not set, throttle counters are in-process");
            Arc::new(MemoryCounterStore::new())
        }
    };

    // --- Notice delivery ---
    let notifier: Arc<dyn Notifier> = match EmailConfig::from_env() {
        Some(email_config) => {
            let smtp = SmtpNotifier::new(email_config).expect("Invalid SMTP configuration");
            tracing::info!("Auth notices delivered over SMTP");
            Arc::new(smtp)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, auth notices are only logged");
            Arc::new(LogNotifier)
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), stores.clone(), counters, notifier);

    // --- Background cleanup ---
    let cleanup_cancel = CancellationToken::new();
    let cleanup_handle = tokio::spawn(session_cleanup::run(
        stores,
        CleanupSchedule {
            interval: Duration::from_secs(config.session_cleanup_interval_secs),
            attempt_retention_days: config.attempt_retention_days,
        },
        cleanup_cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cleanup_cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    let _ = tokio::time::timeout(drain, cleanup_handle).await;
    tracing::info!("Session cleanup stopped");

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
