mod config;
mod document;
mod errors;
mod export;
mod layout;
mod persistence;
mod routes;
mod session;
mod state;
mod store;
mod templates;
mod upstream;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::export::{CommandRasterizer, PdfExporter};
use crate::layout::{default_docx_layout, default_pdf_layout};
use crate::routes::build_router;
use crate::session::{SessionFactory, SessionRegistry, SWEEP_INTERVAL};
use crate::state::AppState;
use crate::store::{KeyValueStore, MemoryStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume API v{}", env!("CARGO_PKG_VERSION"));

    // Snapshot store: Redis when configured, process memory otherwise
    let store: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            let redis = RedisStore::connect(url).await?;
            info!("Redis snapshot store initialized");
            Arc::new(redis)
        }
        None => {
            info!("REDIS_URL not set; snapshots are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let pdf_layout = default_pdf_layout();
    let rasterizer = Arc::new(CommandRasterizer::new(
        config.rasterizer_bin.clone(),
        config.raster_timeout_secs,
    ));
    let pdf = Arc::new(PdfExporter::new(
        rasterizer,
        pdf_layout,
        config.raster_settle,
        config.raster_failure_policy,
    ));
    info!(
        "PDF exporter initialized (rasterizer: {}, on failure: {:?})",
        config.rasterizer_bin, config.raster_failure_policy
    );

    let session_factory = SessionFactory {
        store,
        http: upstream::http_client(),
        upstream_url: config.upstream_api_url.clone(),
        autosave_debounce: config.autosave_debounce,
    };

    let sessions = SessionRegistry::new();
    sessions.spawn_idle_sweeper(config.session_idle_timeout, SWEEP_INTERVAL);
    info!(
        "Idle sessions close after {}s",
        config.session_idle_timeout.as_secs()
    );

    let state = AppState {
        config: config.clone(),
        sessions,
        session_factory,
        pdf,
        docx_layout: default_docx_layout(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
