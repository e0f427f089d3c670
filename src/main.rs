//! Lobstr Payment-Settlement Facilitator
//!
//! Receives signed off-chain payment proofs, applies seller admission
//! control, and settles each one with exactly one on-chain transaction via
//! the direct, escrow-bridge, or credit-facility path.

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod models;
mod services;

use config::Config;
use services::chain::{ChainClient, OnchainClient};
use services::settlement::Facilitator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lobstr_facilitator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Lobstr settlement facilitator");
    tracing::info!("Chain: {} ({})", config.network, config.chain_id);
    tracing::info!("Escrow bridge: {}", config.escrow_bridge_address);
    tracing::info!("Credit facility: {}", config.credit_facility_address);

    // Initialize chain client and facilitator core
    let chain: Arc<dyn ChainClient> = Arc::new(OnchainClient::new(&config).await?);
    let facilitator = Facilitator::new(chain.clone(), &config);
    let state = handlers::AppState::new(config.clone(), chain, facilitator);

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Settlement endpoints
        .route("/settle", post(handlers::settle))
        .route("/verify", post(handlers::verify))
        // Seller trust lookup
        .route("/trust/:seller", get(handlers::seller_trust))
        // State
        .with_state(state)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
