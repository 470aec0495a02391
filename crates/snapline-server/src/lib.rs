use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use snapline_api::routes::router;
use snapline_api::state::{AppState, AppStateInner};
use snapline_db::Database;
use snapline_gateway::Dispatcher;
use snapline_gateway::connection;
use snapline_types::coerce::parse_id;

/// Process configuration, read from `SNAPLINE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub comment_page_size: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
            db_path: PathBuf::from("snapline.db"),
            comment_page_size: 6,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep their
    /// defaults; set but unparsable numbers are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("SNAPLINE_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("SNAPLINE_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("invalid SNAPLINE_PORT: {port}"))?;
        }
        if let Some(path) = lookup("SNAPLINE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(size) = lookup("SNAPLINE_COMMENT_PAGE_SIZE") {
            let size: i64 = size
                .parse()
                .with_context(|| format!("invalid SNAPLINE_COMMENT_PAGE_SIZE: {size}"))?;
            anyhow::ensure!(size > 0, "SNAPLINE_COMMENT_PAGE_SIZE must be positive");
            config.comment_page_size = size;
        }

        Ok(config)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[derive(Clone)]
struct ServerState {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    user_id: Option<String>,
}

/// Assembles the full HTTP surface: REST routes and the realtime endpoint
/// under `/api/v1`, plus `/health`.
pub fn build_app(db: Arc<Database>, dispatcher: Dispatcher, comment_page_size: i64) -> Router {
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: Some(dispatcher.clone()),
        comment_page_size,
    });

    let ws_route = Router::new()
        .route("/message", get(ws_upgrade))
        .with_state(ServerState { db, dispatcher });

    let api = router(app_state).merge(ws_route);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // A missing or malformed userId still gets a connection, just no presence
    let user_id = query.user_id.as_deref().and_then(parse_id);

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, user_id)
    })
}
