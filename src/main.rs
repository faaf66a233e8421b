use std::path::PathBuf;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use courseport::api;
use courseport::cache::CacheContext;
use courseport::db::DbPair;
use courseport::services::StatsService;
use courseport::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courseport=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:courseport.db".to_string());
    let secondary_url = std::env::var("SECONDARY_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:courseport_replica.db".to_string());

    let primary = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    let secondary = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&secondary_url)
        .await?;

    sqlx::migrate!("./migrations").run(&primary).await?;
    sqlx::migrate!("./migrations").run(&secondary).await?;

    let snapshot_path = PathBuf::from(
        std::env::var("SNAPSHOT_PATH").unwrap_or_else(|_| "./submission_cache.bin".to_string()),
    );

    let cache = Arc::new(CacheContext::new());
    cache.restore(&snapshot_path)?;

    let state = AppState {
        db: Arc::new(DbPair::new(primary, secondary)),
        cache: cache.clone(),
        stats: Arc::new(StatsService::new()),
    };

    let app = api::router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "7000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The existence set outlives the process through the snapshot file.
    cache.persist(&snapshot_path)?;
    info!("snapshot written to {}", snapshot_path.display());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {e}");
    }
}
