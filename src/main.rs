use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use roomcast::{
    AppResult, AppState,
    bridge::{consumer::{BridgeConsumer, BridgeHealth}, producer::KafkaPublisher},
    config::Config,
    rooms::{self, hub::Hub},
    store::PgMessageStore,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;

    let hub = Arc::new(Hub::new(config.limits));
    let publisher = Arc::new(KafkaPublisher::new(&config)?);
    let consumer = BridgeConsumer::new(&config, Arc::clone(&hub))?;
    let bridge_health = consumer.health();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(consumer.run(shutdown_rx));

    let app_state = AppState {
        hub,
        store: Arc::new(PgMessageStore::new(db_pool)),
        publisher,
        limits: config.limits,
        bridge_health,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(rooms::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!(port = config.http_port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}

#[debug_handler(state = AppState)]
async fn healthz(State(bridge_health): State<BridgeHealth>) -> impl IntoResponse {
    if bridge_health.is_healthy() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "bridge degraded")
    }
}
