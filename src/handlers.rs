//! HTTP handlers for the settlement facilitator

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::config::Config;
use crate::error::FacilitatorError;
use crate::models::*;
use crate::services::chain::{parse_address, ChainClient};
use crate::services::settlement::Facilitator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub chain: Arc<dyn ChainClient>,
    pub facilitator: Arc<Facilitator>,
}

impl AppState {
    pub fn new(config: Config, chain: Arc<dyn ChainClient>, facilitator: Facilitator) -> Self {
        Self {
            config,
            chain,
            facilitator: Arc::new(facilitator),
        }
    }
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, FacilitatorError> {
    let block_number = state.chain.block_number().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        chain_id: state.config.chain_id,
        block_number,
        network: state.config.network.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Settle a payment.
///
/// Settlement failures are signaled in-body with HTTP 200 so callers can
/// distinguish "payment rejected" from transport errors; 400 is reserved
/// for malformed requests.
pub async fn settle(
    State(state): State<AppState>,
    request: Result<Json<SettleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SettleResponse>), FacilitatorError> {
    let Json(request) = request.map_err(|e| FacilitatorError::BadRequest(e.body_text()))?;
    match state
        .facilitator
        .settle(&request.payment_payload, &request.payment_requirements)
        .await
    {
        Ok(resp) => {
            tracing::info!(tx_hash = ?resp.tx_hash, "settlement complete");
            Ok((StatusCode::OK, Json(resp)))
        }
        Err(e @ FacilitatorError::BadRequest(_)) => Err(e),
        Err(e) => {
            tracing::warn!("settlement failed: {e}");
            Ok((StatusCode::OK, Json(SettleResponse::failure(e.to_string()))))
        }
    }
}

/// Verify a payment proof without settling it
pub async fn verify(
    State(state): State<AppState>,
    request: Result<Json<SettleRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, FacilitatorError> {
    let Json(request) = request.map_err(|e| FacilitatorError::BadRequest(e.body_text()))?;
    let outcome = state
        .facilitator
        .verify(&request.payment_payload, &request.payment_requirements);
    Ok(Json(VerifyResponse {
        is_valid: outcome.is_valid,
        invalid_reason: outcome.invalid_reason,
    }))
}

/// Read a seller's current trust record
pub async fn seller_trust(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<SellerTrust>, FacilitatorError> {
    let seller = parse_address("seller", &address)?;
    let trust = state.facilitator.trust(seller).await?;
    Ok(Json(trust))
}
