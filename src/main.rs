//! TrunkLink - proximity and geofence alerting for tracked wildlife.
//!
//! # Overview
//!
//! The binary wires the pieces together: a SQLite subscriber registry, the
//! upstream location feed, the push delivery channel, the recurring
//! evaluation loop, and the HTTP subscription API.
//!
//! # Configuration
//!
//! - `TRUNKLINK_PORT` - HTTP port to bind (default 4000)
//! - `TRUNKLINK_DATABASE_URL` - SQLite connection string
//! - `TRUNKLINK_FEED_URL` - Base URL of the location feed
//! - `TRUNKLINK_POLL_SECS` - Evaluation cadence in seconds (default 10)
//! - `TRUNKLINK_RADIUS_KM` - Proximity alert radius (default 5)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use trunklink::api::{AppState, router};
use trunklink::dispatch::Dispatcher;
use trunklink::feed::FeedClient;
use trunklink::monitor::{Monitor, MonitorConfig};
use trunklink::push::HttpPushChannel;
use trunklink::registry::Registry;
use trunklink::state::AlertStore;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 4000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:trunklink.db?mode=rwc";

/// Default upstream location feed if not specified via environment variable.
const DEFAULT_FEED_URL: &str = "https://geofence-5bdcc-default-rtdb.firebaseio.com";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("trunklink=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("TRUNKLINK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url =
        env::var("TRUNKLINK_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let feed_url =
        env::var("TRUNKLINK_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());

    let mut monitor_config = MonitorConfig::default();
    if let Some(secs) = env::var("TRUNKLINK_POLL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        monitor_config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(radius) = env::var("TRUNKLINK_RADIUS_KM")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        monitor_config.radius_km = radius;
    }

    info!(port, db_url = %db_url, feed_url = %feed_url, "Starting TrunkLink server");

    // Initialize subscriber registry
    let registry = Registry::new(&db_url).await?;
    info!("Subscriber registry initialized");

    // Wire the evaluation pipeline
    let channel = Arc::new(HttpPushChannel::new());
    let dispatcher = Arc::new(Dispatcher::new(channel, registry.clone()));
    let store = Arc::new(Mutex::new(AlertStore::new()));

    let monitor = Arc::new(Monitor::new(
        FeedClient::new(&feed_url),
        registry.clone(),
        Arc::clone(&dispatcher),
        Arc::clone(&store),
        monitor_config,
    ));
    tokio::spawn(Arc::clone(&monitor).run());

    // Create application state
    let state = AppState {
        registry,
        dispatcher,
        store,
        started_at: Instant::now(),
    };

    // Start server
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "TrunkLink is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
