//! Bridge router: escrow-bridge deposits
//!
//! Moves buyer funds into the escrow bridge and atomically creates an
//! escrowed job record, returning the job id extracted from the receipt.

use alloy::primitives::B256;
use alloy::sol_types::SolEvent;

use crate::error::FacilitatorError;
use crate::models::{Erc3009Authorization, EscrowExtension, PaymentIntent};
use crate::services::chain::{
    parse_address, parse_b256, parse_signature, parse_u256, ChainClient, IEscrowBridge,
    SettlementReceipt, SplitSignature,
};

#[derive(Debug)]
pub struct BridgeOutcome {
    pub tx_hash: B256,
    pub job_id: B256,
}

/// Settles through the escrow bridge.
///
/// Mode A (pre-approved pull) submits just the intent and its signature;
/// mode B (authorization-based pull) bundles the payer's ERC-3009
/// authorization into the same transaction. The mode is chosen by which
/// extension fields are present.
pub async fn settle(
    chain: &dyn ChainClient,
    ext: &EscrowExtension,
) -> Result<BridgeOutcome, FacilitatorError> {
    let intent = to_sol_intent(&ext.payment_intent)?;
    let intent_sig =
        SplitSignature::from(&parse_signature("intentSignature", &ext.intent_signature)?);

    // The contract rejects reused nonces too; checking here fails fast
    // instead of submitting a transaction doomed to revert.
    if chain.intent_nonce_used(intent.nonce).await? {
        return Err(FacilitatorError::Precheck(format!(
            "payment intent nonce {} already used",
            ext.payment_intent.nonce
        )));
    }

    let receipt = match (&ext.erc3009_auth, &ext.erc3009_signature) {
        (Some(auth), Some(auth_sig)) => {
            let auth = to_sol_auth(auth)?;
            let auth_sig = SplitSignature::from(&parse_signature("erc3009Signature", auth_sig)?);
            chain
                .submit_intent_with_authorization(auth, auth_sig, intent, intent_sig)
                .await?
        }
        (None, None) => chain.submit_payment_intent(intent, intent_sig).await?,
        _ => {
            return Err(FacilitatorError::BadRequest(
                "erc3009Auth and erc3009Signature must be provided together".to_string(),
            ))
        }
    };

    let job_id = extract_job_id(&receipt)?;
    Ok(BridgeOutcome {
        tx_hash: receipt.tx_hash,
        job_id,
    })
}

/// A mined transaction without the job-creation event indicates a protocol
/// mismatch, not a transient error; it must never be swallowed.
fn extract_job_id(receipt: &SettlementReceipt) -> Result<B256, FacilitatorError> {
    for log in &receipt.logs {
        if let Ok(decoded) = IEscrowBridge::JobCreated::decode_log(log, true) {
            return Ok(decoded.data.jobId);
        }
    }
    Err(FacilitatorError::AmbiguousOutcome(format!(
        "JobCreated event not found in receipt for transaction {}",
        receipt.tx_hash
    )))
}

fn to_sol_intent(intent: &PaymentIntent) -> Result<IEscrowBridge::PaymentIntent, FacilitatorError> {
    Ok(IEscrowBridge::PaymentIntent {
        nonce: parse_b256("paymentIntent.nonce", &intent.nonce)?,
        payer: parse_address("paymentIntent.payer", &intent.payer)?,
        token: parse_address("paymentIntent.token", &intent.token)?,
        amount: parse_u256("paymentIntent.amount", &intent.amount)?,
        listingId: parse_b256("paymentIntent.listingId", &intent.listing_id)?,
        seller: parse_address("paymentIntent.seller", &intent.seller)?,
        deadline: alloy::primitives::U256::from(intent.deadline),
    })
}

fn to_sol_auth(
    auth: &Erc3009Authorization,
) -> Result<IEscrowBridge::Erc3009Authorization, FacilitatorError> {
    Ok(IEscrowBridge::Erc3009Authorization {
        from: parse_address("erc3009Auth.from", &auth.from)?,
        token: parse_address("erc3009Auth.token", &auth.token)?,
        amount: parse_u256("erc3009Auth.amount", &auth.amount)?,
        validAfter: alloy::primitives::U256::from(auth.valid_after),
        validBefore: alloy::primitives::U256::from(auth.valid_before),
        nonce: parse_b256("erc3009Auth.nonce", &auth.nonce)?,
    })
}
