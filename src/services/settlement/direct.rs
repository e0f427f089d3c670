//! Direct router: standard same-chain settlement
//!
//! No escrow or credit indirection; executes the base payload's ERC-3009
//! authorization against the payment token. This is the default path when
//! no settlement extension is present.

use alloy::primitives::{B256, U256};

use crate::error::FacilitatorError;
use crate::models::{PaymentPayload, PaymentRequirements};
use crate::services::chain::{
    parse_address, parse_b256, parse_signature, parse_u256, ChainClient, SplitSignature,
};

#[derive(Debug)]
pub struct DirectOutcome {
    pub tx_hash: B256,
}

pub async fn settle(
    chain: &dyn ChainClient,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<DirectOutcome, FacilitatorError> {
    let auth = &payload.payload.authorization;

    let token = parse_address("asset", &requirements.asset)?;
    let from = parse_address("authorization.from", &auth.from)?;
    let to = parse_address("authorization.to", &auth.to)?;
    let value = parse_u256("authorization.value", &auth.value)?;
    let nonce = parse_b256("authorization.nonce", &auth.nonce)?;
    let sig = SplitSignature::from(&parse_signature("signature", &payload.payload.signature)?);

    let receipt = chain
        .transfer_with_authorization(
            token,
            from,
            to,
            value,
            U256::from(auth.valid_after),
            U256::from(auth.valid_before),
            nonce,
            sig,
        )
        .await?;

    Ok(DirectOutcome {
        tx_hash: receipt.tx_hash,
    })
}
