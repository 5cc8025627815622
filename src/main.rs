mod auth;
mod db;
mod directory;
mod dto;
mod error;
mod fanout;
mod message;
mod middleware;
mod notification;
mod pagination;
mod routes;
mod state;
mod websocket;

use anyhow::Context;
use db::{create_pool, run_migrations};
use directory::{Directory, DirectoryRepository, DirectorySeed, InMemoryDirectory};
use message::{InMemoryThreadStore, MessageRepository, ThreadStore};
use notification::{InMemoryNotificationStore, NotificationRepository, NotificationStore};
use routes::create_router;
use state::{AppState, Config, StorageBackend};
use std::{path::Path, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marketplace_messaging=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env().context("invalid configuration")?);

    let (threads, notifications, directory) = match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            tracing::info!("Connecting to database...");
            let db = create_pool(database_url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;

            tracing::info!("Running migrations...");
            run_migrations(&db)
                .await
                .context("failed to run migrations")?;

            (
                Arc::new(MessageRepository::new(db.clone())) as Arc<dyn ThreadStore>,
                Arc::new(NotificationRepository::new(db.clone())) as Arc<dyn NotificationStore>,
                Arc::new(DirectoryRepository::new(db)) as Arc<dyn Directory>,
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let directory = match &config.directory_seed {
                Some(path) => InMemoryDirectory::from_seed(load_seed(path).await?),
                None => InMemoryDirectory::new(),
            };

            (
                Arc::new(InMemoryThreadStore::new()) as Arc<dyn ThreadStore>,
                Arc::new(InMemoryNotificationStore::new()) as Arc<dyn NotificationStore>,
                Arc::new(directory) as Arc<dyn Directory>,
            )
        }
    };

    let state = AppState::new(config.clone(), threads, notifications, directory);

    // Create router
    let app = create_router(state);

    // Start server
    let addr = config.addr();

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn load_seed(path: &Path) -> anyhow::Result<DirectorySeed> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read directory seed {}", path.display()))?;
    let seed: DirectorySeed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid directory seed {}", path.display()))?;

    tracing::info!(
        users = seed.users.len(),
        products = seed.products.len(),
        "Directory seeded"
    );
    Ok(seed)
}
