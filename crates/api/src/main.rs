//! API server entry point.

use std::sync::Arc;

use api::Config;
use api::config::LogFormat;
use api::state::{SharedEventStore, SharedProjectionStore};
use event_store::{InMemoryEventStore, PostgresEventStore};
use projections::{InMemoryProjectionStore, PostgresProjectionStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Connects the stores selected by `DATABASE_URL`.
async fn open_stores(config: &Config) -> (SharedEventStore, SharedProjectionStore, &'static str) {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores");
        return (
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryProjectionStore::new()),
            "memory",
        );
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await
        .expect("failed to connect to database");

    let events = PostgresEventStore::new(pool.clone());
    events
        .run_migrations()
        .await
        .expect("failed to run migrations");

    (
        Arc::new(events),
        Arc::new(PostgresProjectionStore::new(pool)),
        "postgres",
    )
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open stores and wire the application
    let (events, documents, storage) = open_stores(&config).await;
    let application = api::build_application(events, documents, storage, &config)
        .expect("invalid projection wiring");

    // 4. Bring the read model up to date with the event log
    let applied = application
        .processor
        .run_catch_up()
        .await
        .expect("catch-up failed");
    tracing::info!(applied, "projections caught up");

    // 5. Build the application
    let app = api::create_app(application.state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, storage, delivery = ?config.projection_delivery, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The router held the last publisher; the worker drains its queue and exits.
    if let Some(worker) = application.worker
        && let Err(err) = worker.await
    {
        tracing::error!(error = %err, "projection worker panicked");
    }

    tracing::info!("server shut down gracefully");
}
