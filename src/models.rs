//! Data models for the settlement API and the on-chain trust domain

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extension key selecting the credit-facility settlement path.
pub const EXT_CREDIT: &str = "lobstr-credit";
/// Extension key selecting the escrow-bridge settlement path.
pub const EXT_ESCROW: &str = "lobstr-escrow";
/// Extension key under which post-settlement trust enrichment is attached.
pub const EXT_TRUST: &str = "lobstr-trust";

/// Payment requirements published by the seller's service description.
///
/// Consumed, never created, by the facilitator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub pay_to: String,
    pub asset: String,
    /// Atomic token units, decimal string.
    pub max_amount_required: String,
    /// EIP-712 domain of the payment token, when it differs from the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<TokenEip712Domain>,
}

/// Token EIP-712 domain fields carried in `PaymentRequirements.extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEip712Domain {
    pub name: String,
    pub version: String,
}

/// Buyer-signed payment proof, optionally carrying one settlement extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    pub payload: ExactEvmPayload,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// Exact-scheme EVM payload: an ERC-3009 authorization plus its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// 65-byte hex signature over the EIP-712 digest of `authorization`.
    pub signature: String,
    pub authorization: TransferAuthorization,
}

/// ERC-3009 `TransferWithAuthorization` message fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: String,
    pub to: String,
    /// Atomic token units, decimal string.
    pub value: String,
    pub valid_after: u64,
    pub valid_before: u64,
    /// 32-byte hex nonce.
    pub nonce: String,
}

/// Escrow-bridge extension payload (`lobstr-escrow`).
///
/// Mode A carries only the intent and its signature; mode B additionally
/// carries an ERC-3009 authorization signed by the payer so the bridge can
/// pull funds without a prior on-chain approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowExtension {
    pub payment_intent: PaymentIntent,
    pub intent_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erc3009_auth: Option<Erc3009Authorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erc3009_signature: Option<String>,
}

/// Signed intent to fund an escrowed job through the bridge contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// 32-byte hex nonce, unique per intent. Idempotency anchor for the
    /// bridge path: checked against the on-chain used-nonce set.
    pub nonce: String,
    pub payer: String,
    pub token: String,
    pub amount: String,
    pub listing_id: String,
    pub seller: String,
    pub deadline: u64,
}

/// Time-windowed, single-use ERC-3009 transfer authorization (bridge mode B).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc3009Authorization {
    pub from: String,
    pub token: String,
    pub amount: String,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: String,
}

/// Credit-facility extension payload (`lobstr-credit`).
///
/// Carries no signature of its own; the facilitator's signer acts as an
/// authorized operator for the agent, established out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditDrawRequest {
    pub agent: String,
    pub listing_id: String,
    pub seller: String,
    pub amount: String,
}

/// Reputation tier labels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReputationTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl ReputationTier {
    /// Maps an on-chain tier index to a label. Out-of-range indices fall
    /// back to the lowest tier: new tiers may appear on-chain before the
    /// facilitator is redeployed.
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Bronze,
            1 => Self::Silver,
            2 => Self::Gold,
            3 => Self::Platinum,
            _ => Self::Bronze,
        }
    }
}

/// Stake tier labels, lowest first. `None` means no active stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeTier {
    None,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl StakeTier {
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Self::None,
            1 => Self::Bronze,
            2 => Self::Silver,
            3 => Self::Gold,
            4 => Self::Platinum,
            _ => Self::None,
        }
    }
}

/// Normalized on-chain trust record for a seller.
///
/// Recomputed per request; stake and reputation can change between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerTrust {
    pub address: String,
    pub reputation_score: u64,
    pub reputation_tier: ReputationTier,
    pub stake_tier: StakeTier,
    /// Atomic token units, decimal string.
    pub stake_amount: String,
    pub completed_jobs: u64,
    pub disputes_won: u64,
    pub disputes_lost: u64,
}

/// Body of `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Body of `POST /settle` responses. Exactly one of `tx_hash` or
/// `error_reason` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl SettleResponse {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error_reason: Some(reason.into()),
            extensions: BTreeMap::new(),
        }
    }
}

/// Body of `POST /verify` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub chain_id: u64,
    pub block_number: u64,
    pub network: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_tier_index_maps_labels() {
        assert_eq!(StakeTier::from_index(0), StakeTier::None);
        assert_eq!(StakeTier::from_index(4), StakeTier::Platinum);
    }

    #[test]
    fn out_of_range_tier_falls_back_to_lowest() {
        assert_eq!(StakeTier::from_index(17), StakeTier::None);
        assert_eq!(ReputationTier::from_index(9), ReputationTier::Bronze);
    }

    #[test]
    fn settle_request_parses_camel_case_wire_format() {
        let body = serde_json::json!({
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "base-sepolia",
                "payload": {
                    "signature": "0x00",
                    "authorization": {
                        "from": "0x0000000000000000000000000000000000000001",
                        "to": "0x0000000000000000000000000000000000000002",
                        "value": "100",
                        "validAfter": 0,
                        "validBefore": 99,
                        "nonce": "0x0000000000000000000000000000000000000000000000000000000000000001"
                    }
                },
                "extensions": {
                    "lobstr-credit": {
                        "agent": "0x0000000000000000000000000000000000000003",
                        "listingId": "0x0000000000000000000000000000000000000000000000000000000000000002",
                        "seller": "0x0000000000000000000000000000000000000002",
                        "amount": "100"
                    }
                }
            },
            "paymentRequirements": {
                "scheme": "exact",
                "network": "base-sepolia",
                "payTo": "0x0000000000000000000000000000000000000002",
                "asset": "0x0000000000000000000000000000000000000004",
                "maxAmountRequired": "100"
            }
        });

        let req: SettleRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.payment_payload.scheme, "exact");
        assert!(req.payment_payload.extensions.contains_key(EXT_CREDIT));
        let draw: CreditDrawRequest = serde_json::from_value(
            req.payment_payload.extensions[EXT_CREDIT].clone(),
        )
        .unwrap();
        assert_eq!(draw.amount, "100");
    }
}
