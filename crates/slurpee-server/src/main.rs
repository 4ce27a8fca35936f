//! Slurpee Server Entry Point
//!
//! Process bootstrap for the durable HTTP event broker: config, pool,
//! subscription cache, delivery engine, resumer and HTTP listener, wired
//! up in dependency order.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slurpee_cache::SubscriptionCache;
use slurpee_core::config::AppConfig;
use slurpee_dispatch::Dispatcher;
use slurpee_events::EventBus;
use slurpee_store::{PgStore, Store};

use slurpee_server::middleware;
use slurpee_server::routes;
use slurpee_server::shutdown::{listen_for_shutdown_signals, ShutdownController};
use slurpee_server::state::AppState;

/// Slurpee - a durable HTTP event broker.
#[derive(Parser, Debug)]
#[command(name = "slurpee-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to run the server on (overrides SLURPEE_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind the server to (overrides SLURPEE_HOST)
    #[arg(long)]
    host: Option<String>,
}

fn init_tracing(config: &slurpee_core::config::LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slurpee=info,tower_http=info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    init_tracing(&config.logging);

    info!("starting Slurpee event broker");
    info!(version = env!("CARGO_PKG_VERSION"), "version");

    match run(config).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "fatal error during startup");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("connecting to database");
    let pool = PgPoolOptions::new()
        .min_connections(config.database.pool_min)
        .max_connections(config.database.pool_max)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await?;
    info!("database connection established");

    if config.database.run_migrations {
        info!("running database migrations");
        slurpee_store::run_migrations(&pool).await?;
    }

    let config = Arc::new(config);
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let cache = Arc::new(SubscriptionCache::new(store.clone()));
    let bus = EventBus::new();

    let (dispatcher, handles) = Dispatcher::start(
        store.clone(),
        cache.clone(),
        bus.clone(),
        config.delivery.clone(),
    );

    info!("resuming events from a prior run, if any");
    slurpee_dispatch::resume(&dispatcher).await;

    let app_state = AppState::new(config.clone(), store.clone(), cache, bus, dispatcher.clone());

    let app = routes::router()
        .layer(axum::middleware::from_fn(middleware::body_limit))
        .layer(middleware::cors_layer())
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(app_state);

    let addr: SocketAddr = config.server.address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "listening");

    let shutdown_controller = ShutdownController::new();
    let signal_waiter = shutdown_controller.clone();
    tokio::spawn(listen_for_shutdown_signals(signal_waiter));

    let serve_shutdown = shutdown_controller.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { serve_shutdown.wait().await })
        .await?;

    // Graceful shutdown, triggered once the listener above has stopped
    // accepting new connections.
    info!("running shutdown sequence");
    dispatcher.cancel_retry_timers();
    dispatcher.close_ingest().await;

    let shutdown_timeout = config.server.shutdown_timeout();
    if tokio::time::timeout(shutdown_timeout, dispatcher.inflight().wait_zero())
        .await
        .is_err()
    {
        tracing::warn!("shutdown timeout reached while draining in-flight deliveries");
    }

    dispatcher.close_task_queue().await;
    for handle in handles.workers {
        let _ = handle.await;
    }
    let _ = handles.ingester.await;

    // The pool closes when `store`'s last `Arc` drops here.
    drop(store);

    Ok(())
}
