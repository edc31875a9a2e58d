//! Courier server entry point.

use std::sync::Arc;

use courier_common::Config;
use courier_queue::{
    JobQueue, JobStore, PgCounterStore, PgJobStore, PgSequenceStore, RateLimiter, RetryPolicy,
    SchedulerConfig, SequenceStore, SequenceTracker, run_scheduler,
};
use courier_server::{AppState, build_registry, router};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Install the tracing subscriber. `COURIER_LOG_FORMAT=json` switches to
/// JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier=debug,tower_http=debug".into());
    let json = std::env::var("COURIER_LOG_FORMAT").is_ok_and(|v| v == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting courier server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = courier_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    courier_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize stores
    let db = Arc::new(db);
    let job_store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(Arc::clone(&db)));
    let sequence_store: Arc<dyn SequenceStore> =
        Arc::new(PgSequenceStore::new(Arc::clone(&db)));
    let counter_store = Arc::new(PgCounterStore::new(Arc::clone(&db)));

    // Initialize components
    let queue = JobQueue::new(job_store.clone())
        .with_retry_policy(RetryPolicy::from_config(&config.dispatcher));
    let limiter = RateLimiter::new(counter_store);
    let sequences = SequenceTracker::new(sequence_store.clone());
    let registry = Arc::new(build_registry(&config, sequence_store, job_store));
    info!(job_types = ?registry.job_types(), "Processors registered");

    // Start the periodic trigger if enabled
    let scheduler = if config.dispatcher.enabled {
        info!(
            interval_secs = config.dispatcher.interval_secs,
            batch_size = config.dispatcher.batch_size,
            "Starting scheduler"
        );
        run_scheduler(
            SchedulerConfig::from(&config.dispatcher),
            queue.clone(),
            registry.clone(),
            Some(limiter.clone()),
        )
    } else {
        info!("Scheduler disabled; dispatch runs only through /api/cron/dispatch");
        Vec::new()
    };

    let state = AppState::new(&config, queue, registry, limiter, sequences)?;

    // Build router
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in scheduler {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}
