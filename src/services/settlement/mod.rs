//! Facilitator core: extension dispatch and the settlement pipeline
//!
//! Single entry point for converting a verified payment proof into exactly
//! one on-chain state transition. Pipeline: route selection, proof
//! verification, before-settle admission control, router invocation,
//! best-effort after-settle trust enrichment.

pub mod bridge;
pub mod credit;
pub mod direct;

use alloy::primitives::Address;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::FacilitatorError;
use crate::models::{
    CreditDrawRequest, EscrowExtension, PaymentPayload, PaymentRequirements, SellerTrust,
    SettleResponse, StakeTier, EXT_CREDIT, EXT_ESCROW, EXT_TRUST,
};
use crate::services::chain::{parse_address, ChainClient};
use crate::services::trust::TrustOracle;
use crate::services::verify::{ProofVerifier, VerifyOutcome};

/// The settlement path for one request, decided once from the extension map.
#[derive(Debug)]
pub enum Route {
    Direct,
    Bridge(EscrowExtension),
    Credit(CreditDrawRequest),
}

/// Process-wide admission thresholds applied by the before-settle hook.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub min_reputation_score: u64,
    pub require_active_stake: bool,
}

pub struct Facilitator {
    chain: Arc<dyn ChainClient>,
    oracle: TrustOracle,
    verifier: ProofVerifier,
    policy: AdmissionPolicy,
}

impl Facilitator {
    pub fn new(chain: Arc<dyn ChainClient>, config: &Config) -> Self {
        Self {
            oracle: TrustOracle::new(chain.clone()),
            verifier: ProofVerifier::new(config.chain_id),
            policy: AdmissionPolicy {
                min_reputation_score: config.min_reputation_score,
                require_active_stake: config.require_active_stake,
            },
            chain,
        }
    }

    /// Picks exactly one router from the payload's extension map.
    ///
    /// More than one settlement extension is a configuration error on the
    /// buyer side; it is rejected rather than resolved by precedence.
    pub fn select_route(payload: &PaymentPayload) -> Result<Route, FacilitatorError> {
        for key in payload.extensions.keys() {
            if key != EXT_CREDIT && key != EXT_ESCROW {
                return Err(FacilitatorError::BadRequest(format!(
                    "unsupported extension {key:?}"
                )));
            }
        }
        if payload.extensions.contains_key(EXT_CREDIT) && payload.extensions.contains_key(EXT_ESCROW)
        {
            return Err(FacilitatorError::BadRequest(format!(
                "at most one settlement extension may be present, got both {EXT_CREDIT:?} and {EXT_ESCROW:?}"
            )));
        }

        if let Some(value) = payload.extensions.get(EXT_CREDIT) {
            let draw: CreditDrawRequest = serde_json::from_value(value.clone()).map_err(|e| {
                FacilitatorError::BadRequest(format!("malformed {EXT_CREDIT} extension: {e}"))
            })?;
            return Ok(Route::Credit(draw));
        }
        if let Some(value) = payload.extensions.get(EXT_ESCROW) {
            let escrow: EscrowExtension = serde_json::from_value(value.clone()).map_err(|e| {
                FacilitatorError::BadRequest(format!("malformed {EXT_ESCROW} extension: {e}"))
            })?;
            return Ok(Route::Bridge(escrow));
        }
        Ok(Route::Direct)
    }

    /// Verification only; no admission control, no chain writes.
    pub fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyOutcome {
        self.verifier.verify(payload, requirements)
    }

    pub async fn trust(&self, seller: Address) -> Result<SellerTrust, FacilitatorError> {
        self.oracle.query_trust(seller).await
    }

    /// Settles one payment. Every error is terminal for the request; retry
    /// policy belongs to the caller.
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorError> {
        let route = Self::select_route(payload)?;

        let outcome = self.verifier.verify(payload, requirements);
        if !outcome.is_valid {
            return Err(FacilitatorError::Verification(
                outcome
                    .invalid_reason
                    .unwrap_or_else(|| "invalid payment payload".to_string()),
            ));
        }

        let seller = parse_address("payTo", &requirements.pay_to)?;
        self.before_settle(seller).await?;

        let (tx_hash, mut extensions) = match &route {
            Route::Direct => {
                let out = direct::settle(self.chain.as_ref(), payload, requirements).await?;
                (out.tx_hash, BTreeMap::new())
            }
            Route::Bridge(ext) => {
                let out = bridge::settle(self.chain.as_ref(), ext).await?;
                let mut extensions = BTreeMap::new();
                extensions.insert(
                    EXT_ESCROW.to_string(),
                    json!({ "jobId": out.job_id.to_string() }),
                );
                (out.tx_hash, extensions)
            }
            Route::Credit(draw) => {
                let out = credit::settle(self.chain.as_ref(), draw).await?;
                let mut extensions = BTreeMap::new();
                extensions.insert(
                    EXT_CREDIT.to_string(),
                    json!({
                        "drawId": out.draw_id.to_string(),
                        "jobId": out.job_id.to_string(),
                    }),
                );
                (out.tx_hash, extensions)
            }
        };

        self.after_settle(seller, &mut extensions).await;

        Ok(SettleResponse {
            success: true,
            tx_hash: Some(tx_hash.to_string()),
            error_reason: None,
            extensions,
        })
    }

    /// Before-settle hook: admission control against the seller's trust
    /// record. A failed trust query means "cannot admit".
    async fn before_settle(&self, seller: Address) -> Result<(), FacilitatorError> {
        let trust = self.oracle.query_trust(seller).await?;

        if self.policy.require_active_stake && trust.stake_tier == StakeTier::None {
            return Err(FacilitatorError::AdmissionRejected(format!(
                "seller {seller} has no active stake"
            )));
        }
        if trust.reputation_score < self.policy.min_reputation_score {
            return Err(FacilitatorError::AdmissionRejected(format!(
                "seller reputation score {} below minimum {}",
                trust.reputation_score, self.policy.min_reputation_score
            )));
        }
        Ok(())
    }

    /// After-settle hook: re-queries trust (settlement itself can move the
    /// completed-job counter) and attaches it for the caller. Best-effort:
    /// enrichment failure never fails a completed settlement.
    async fn after_settle(
        &self,
        seller: Address,
        extensions: &mut BTreeMap<String, serde_json::Value>,
    ) {
        match self.oracle.query_trust(seller).await {
            Ok(trust) => {
                extensions.insert(
                    EXT_TRUST.to_string(),
                    serde_json::to_value(trust).unwrap_or(serde_json::Value::Null),
                );
            }
            Err(e) => {
                tracing::warn!("post-settlement trust query failed for {seller}: {e}");
            }
        }
    }
}
