use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use chrono_tz::Tz;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use shopchat::config::AppConfig;
use shopchat::db;
use shopchat::handlers;
use shopchat::models::Catalog;
use shopchat::services::ai::openai::OpenAiProvider;
use shopchat::services::calendar::google::GoogleCalendarProvider;
use shopchat::state::{AppState, SessionLocks};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    // Configuration problems are fatal here, before the listener binds.
    let tz: Tz = config
        .shop_timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid SHOP_TIMEZONE '{}': {e}", config.shop_timezone))?;
    anyhow::ensure!(
        !config.openai_api_key.is_empty(),
        "OPENAI_API_KEY must be set"
    );
    anyhow::ensure!(
        !config.google_api_token.is_empty(),
        "GOOGLE_API_TOKEN must be set"
    );

    let catalog = Catalog::load(&config.catalog_path)?;
    tracing::info!(
        vehicles = catalog.vehicles.len(),
        path = %config.catalog_path,
        "vehicle catalog loaded"
    );

    let conn = db::init_db(&config.database_url)?;

    let llm = OpenAiProvider::new(config.openai_api_key.clone(), config.openai_model.clone());
    let calendar = GoogleCalendarProvider::new(config.google_api_token.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        catalog,
        tz,
        llm: Box::new(llm),
        calendar: Box::new(calendar),
        session_locks: SessionLocks::default(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/chat", post(handlers::chat::chat))
        .route("/reset", get(handlers::chat::reset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
