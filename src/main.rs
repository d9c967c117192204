//! ponymail-view: a server-rendered Pony Mail thread viewer.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from a TOML file, creates the backend client and its escrow
//! monitor, sets up the Axum router and serves until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ponymail_view::api::{ApiClient, Escrow};
use ponymail_view::config::{
    AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, ESCROW_CHECK_INTERVAL_MS,
    ESCROW_MAX_WAIT_MS,
};
use ponymail_view::fixup::{FixupMode, FixupOptions};
use ponymail_view::http::start_server;
use ponymail_view::routes::create_router;
use ponymail_view::state::AppState;
use ponymail_view::templates::init_templates;

/// ponymail-view: threaded HTML views of a Pony Mail archive
#[derive(Parser, Debug)]
#[command(name = "ponymail-view", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "ponymail_view=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration first: it decides the log format
    let mut config = AppConfig::load(&args.config)?;
    config.ui.version = env!("CARGO_PKG_VERSION").to_string();

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        config = %args.config,
        backend = %config.backend.api_url,
        chatty = config.ui.chatty,
        compact_quotes = config.ui.compact_quotes,
        "Loaded configuration"
    );

    // Initialize Tera templates
    let tera = init_templates(&config.ui)?;
    tracing::info!("Initialized templates");

    // Escrow table and the monitor driving the loading indicator
    let escrow = Arc::new(Escrow::new(Duration::from_millis(ESCROW_MAX_WAIT_MS)));
    let _monitor = escrow.spawn_monitor(Duration::from_millis(ESCROW_CHECK_INTERVAL_MS));

    let client = ApiClient::new(&config.backend, &config.cache, Arc::clone(&escrow))?;
    tracing::info!(
        cache_entries = config.cache.max_entries,
        cache_ttl_seconds = config.cache.ttl_seconds,
        "Initialized backend client"
    );

    let fixup = FixupOptions::from_config(
        FixupMode {
            chatty: config.ui.chatty,
            compact_quotes: config.ui.compact_quotes,
        },
        &config.fixup,
    )?;
    tracing::info!(
        quote_patterns = ?fixup.patterns.names().collect::<Vec<_>>(),
        "Initialized fixup engine"
    );

    let http = config.http.clone();
    let state = AppState::new(config, tera, Arc::new(client), escrow, fixup);
    let app = create_router(state);

    start_server(app, &http).await?;

    Ok(())
}
