//! Credit router: credit-facility draws
//!
//! Funds a job from an agent's pre-established credit line instead of moving
//! buyer funds at settlement time. The facilitator's signer is the caller,
//! acting as an operator authorized for the agent out-of-band.

use alloy::primitives::B256;
use alloy::sol_types::SolEvent;

use crate::error::FacilitatorError;
use crate::models::CreditDrawRequest;
use crate::services::chain::{
    parse_address, parse_b256, parse_u256, ChainClient, ICreditFacility, SettlementReceipt,
};

#[derive(Debug)]
pub struct CreditOutcome {
    pub tx_hash: B256,
    pub draw_id: B256,
    pub job_id: B256,
}

pub async fn settle(
    chain: &dyn ChainClient,
    draw: &CreditDrawRequest,
) -> Result<CreditOutcome, FacilitatorError> {
    let agent = parse_address("agent", &draw.agent)?;
    let listing_id = parse_b256("listingId", &draw.listing_id)?;
    let seller = parse_address("seller", &draw.seller)?;
    let amount = parse_u256("amount", &draw.amount)?;

    let available = chain.available_credit(agent).await?;
    if available < amount {
        return Err(FacilitatorError::Precheck(format!(
            "insufficient credit for agent {agent}: available {available}, required {amount}"
        )));
    }

    let receipt = chain.draw_credit(agent, listing_id, seller, amount).await?;

    let (draw_id, job_id) = extract_draw(&receipt)?;
    Ok(CreditOutcome {
        tx_hash: receipt.tx_hash,
        draw_id,
        job_id,
    })
}

/// Extracts the draw id and the escrow job id it produced; a mined
/// transaction without the event is a hard failure.
fn extract_draw(receipt: &SettlementReceipt) -> Result<(B256, B256), FacilitatorError> {
    for log in &receipt.logs {
        if let Ok(decoded) = ICreditFacility::CreditDrawn::decode_log(log, true) {
            return Ok((decoded.data.drawId, decoded.data.jobId));
        }
    }
    Err(FacilitatorError::AmbiguousOutcome(format!(
        "CreditDrawn event not found in receipt for transaction {}",
        receipt.tx_hash
    )))
}
