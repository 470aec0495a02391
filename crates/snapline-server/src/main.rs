use std::sync::Arc;

use tracing::info;

use snapline_db::Database;
use snapline_gateway::Dispatcher;
use snapline_server::{Config, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapline=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("database ready at {}", config.db_path.display());

    // Rooms and presence start empty on every boot
    let dispatcher = Dispatcher::new();
    let app = build_app(db, dispatcher, config.comment_page_size);

    let addr = config.addr()?;
    info!("Snapline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
