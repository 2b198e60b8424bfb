//! RPHUD Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rphud_engine::api;
use rphud_engine::infrastructure::{
    assets::AssetLoader,
    callback::HttpCallbackClient,
    clock::SystemClock,
    config::AppConfig,
    database::{schema, ConnectionRegistry, DEFAULT_CONNECTION},
    ports::ClockPort,
    session::InMemorySessionStore,
};
use rphud_engine::use_cases::CharacterAssets;
use rphud_engine::App;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rphud_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RPHUD Engine");

    let config = AppConfig::from_env()?;

    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock);

    tracing::info!(url = %config.database_url, "Opening database");
    let registry = ConnectionRegistry::connect(&config.database())
        .await
        .context("failed to open database")?;
    let pool = registry
        .pool(DEFAULT_CONNECTION)
        .context("default connection missing")?;
    schema::ensure_schema(pool)
        .await
        .context("failed to apply schema")?;
    if config.legacy_database_url.is_some() {
        tracing::info!("Legacy character import enabled");
    }

    let loader = AssetLoader::new(&config.asset_dir);
    let templates = loader
        .load_templates()
        .with_context(|| format!("failed to load templates from {}", config.asset_dir.display()))?;
    let attach_points = loader
        .load_attach_points()
        .context("failed to load attach points")?;
    tracing::info!(attach_points = attach_points.len(), "Assets loaded");

    let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl(), clock.clone()));
    spawn_session_purge(sessions.clone());

    let callbacks = Arc::new(HttpCallbackClient::new(config.callback_timeout));

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;

    let app = Arc::new(App::new(
        config,
        Arc::new(registry),
        CharacterAssets::new(templates, attach_points),
        sessions,
        callbacks,
        clock,
    ));

    let router = api::routes(app).layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn spawn_session_purge(sessions: Arc<InMemorySessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired sessions");
            }
        }
    });
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
