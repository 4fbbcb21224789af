use std::sync::Arc;

use tracing::info;

use flock_db::Database;
use flock_server::config::Config;
use flock_server::{app_state, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flock=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.addr()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let app = build_router(app_state(db, &config));

    info!("Flock server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
