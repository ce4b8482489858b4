//! Dockroute Server - mission planning backend for docking-aware drone routes

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dockroute_server::{api, config::Config, loops, persistence, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dockroute_server=debug,dockroute_core=info".into()),
        )
        .init();

    tracing::info!("Starting Dockroute Server...");

    let config = Config::from_env();
    let port = config.server_port;

    let db = persistence::init_database(&config.database_path, config.database_max_connections)
        .await
        .context("Failed to initialize database")?;
    let state = Arc::new(AppState::with_database(db, config.clone()));
    state
        .load_from_database()
        .await
        .context("Failed to load persisted state")?;

    tokio::spawn(loops::feed_sync_loop::run_feed_sync_loop(state.clone(), config));

    let app = api::create_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
