use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    admin_auth::AdminAuthService,
    content_processor::DocumentProcessor,
    github_store::{GitHubFileStore, RemoteObjectStore},
    kv_store::{KeyValueStore, SqliteKeyValueStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting blog-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        // Create parent directory if needed
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {:?}", parent))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLite refuses to create the file itself unless asked to
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            Ok(_) => tracing::debug!("File can be created/opened successfully."),
            Err(e) => tracing::warn!("Failed to open file manually: {}", e),
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );
    let kv = SqliteKeyValueStore::new(db.clone());

    // --- Handle migration mode ---
    if migrate {
        kv.migrate().await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let store: Arc<dyn KeyValueStore> = Arc::new(kv);
    let remote: Arc<dyn RemoteObjectStore> =
        Arc::new(GitHubFileStore::new(store.clone(), cfg.github_settings())?);
    let auth = AdminAuthService::new(
        store.clone(),
        cfg.admin_default_password.as_str(),
        cfg.session_ttl(),
    );
    let state = state::AppState::new(
        db,
        store,
        remote,
        DocumentProcessor::new(cfg.max_upload_bytes()),
        auth,
    );

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes()).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
