mod auth;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod routes;
mod scheduling;
mod store;

use std::sync::Arc;

use crate::{
    config::Config,
    models::AppState,
    scheduling::service::SchedulingService,
    store::{ReservationStore, SessionDirectory, memory::MemoryStore, postgres::PgStore},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let (reservations, sessions): (Arc<dyn ReservationStore>, Arc<dyn SessionDirectory>) = match &cfg.database_url {
        Some(url) => {
            if cfg.seed_file.is_some() {
                tracing::warn!("SEED_FILE is ignored when DATABASE_URL is set");
            }
            let pool = db::connect_pg(url, cfg.db_max_connections, cfg.store_timeout).await?;
            db::migrate(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            (store.clone() as Arc<dyn ReservationStore>, store as Arc<dyn SessionDirectory>)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; nothing will persist");
            let store = Arc::new(MemoryStore::new());
            if let Some(path) = &cfg.seed_file {
                let raw = std::fs::read_to_string(path)?;
                store.load_seed(serde_json::from_str(&raw)?);
            }
            (store.clone() as Arc<dyn ReservationStore>, store as Arc<dyn SessionDirectory>)
        }
    };

    let state = AppState {
        scheduler: SchedulingService::new(reservations, cfg.store_timeout),
        sessions,
        store_timeout: cfg.store_timeout,
    };

    // Browser front desk clients call the API cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
