//! FairPlay Cloud — player risk analysis server.
//!
//! Receives batches of game-session player profiles, groups them into
//! skill-level cohorts, blends each cohort with cached history from the
//! player store, scores the cohorts concurrently with an isolation
//! forest, and answers with a single Low/Medium/High risk verdict.
//!
//! # Pipeline
//!
//! ```text
//! POST /analyze ──► Normalizer ──► Cohort Builder ──► Orchestrator
//!                                                     │ (one task
//!                                                     │  per level)
//!                               Player Store ◄──────► │ ──► Scorer
//!                                                     ▼
//!                                            Risk Aggregator ──► verdict
//! ```

mod config;
mod error;
mod handlers;
mod logic;
mod models;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::logic::isolation::IsolationForest;
use crate::logic::pipeline::AnalysisPipeline;
use crate::store::RedisPlayerStore;

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairplay_cloud=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("FairPlay Cloud starting ({})...", config.environment);

    // Connect the player cache. Startup requires the store to be there;
    // once running, store outages degrade to an empty history instead.
    let player_store = RedisPlayerStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to player cache")?;

    let pipeline = AnalysisPipeline::new(
        Arc::new(player_store),
        Arc::new(IsolationForest::new()),
    );

    // Build application state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/analyze", post(handlers::analyze::analyze))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
