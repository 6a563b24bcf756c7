mod cache;
mod classifier;
mod config;
mod credentials;
mod db;
mod errors;
mod events;
mod items;
mod models;
mod routes;
mod sources;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::QueryCache;
use crate::classifier::AnthropicClassifier;
use crate::config::Config;
use crate::credentials::PgCredentialStore;
use crate::db::create_pool;
use crate::events::EventBus;
use crate::items::store::PgItemStore;
use crate::routes::build_router;
use crate::sources::{gmail::GmailSource, slack::SlackSource};
use crate::state::{AppState, SourceSet};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let crate_target = env!("CARGO_PKG_NAME").replace('-', "_");
            EnvFilter::new(format!("{}={}", crate_target, &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Beacon API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // One HTTP client for both source APIs; the classifier builds its own
    // with a longer timeout.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let sources = SourceSet::new(
        Arc::new(GmailSource::new(http.clone())),
        Arc::new(SlackSource::new(http)),
    );

    let classifier = Arc::new(AnthropicClassifier::new(config.anthropic_api_key.clone()));
    info!("Classifier initialized (model: {})", classifier::MODEL);

    // Build app state
    let state = AppState {
        store: Arc::new(PgItemStore::new(db.clone())),
        classifier,
        credentials: Arc::new(PgCredentialStore::new(db)),
        cache: Arc::new(QueryCache::new()),
        events: EventBus::new(),
        sources,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
