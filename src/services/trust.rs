//! Trust oracle: normalized on-chain reputation and stake reads
//!
//! Pure read path. Trust is recomputed for every request because stake and
//! reputation can change between calls (and as a side effect of settlement).

use alloy::primitives::Address;
use std::sync::Arc;

use crate::error::FacilitatorError;
use crate::models::{ReputationTier, SellerTrust, StakeTier};
use crate::services::chain::ChainClient;

pub struct TrustOracle {
    chain: Arc<dyn ChainClient>,
}

impl TrustOracle {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Reads the four independent trust values concurrently and merges them
    /// into one record.
    ///
    /// Propagates RPC errors; callers must treat a failed query as "cannot
    /// admit", never as "admit by default".
    pub async fn query_trust(&self, seller: Address) -> Result<SellerTrust, FacilitatorError> {
        let (reputation, detail, stake_tier, stake_amount) = tokio::join!(
            self.chain.reputation_of(seller),
            self.chain.reputation_detail(seller),
            self.chain.stake_tier_of(seller),
            self.chain.stake_of(seller),
        );

        let (score, reputation_tier) = reputation?;
        let (completed_jobs, disputes_won, disputes_lost) = detail?;
        let stake_tier = stake_tier?;
        let stake_amount = stake_amount?;

        Ok(SellerTrust {
            address: seller.to_string(),
            reputation_score: score.try_into().unwrap_or(u64::MAX),
            reputation_tier: ReputationTier::from_index(reputation_tier),
            stake_tier: StakeTier::from_index(stake_tier),
            stake_amount: stake_amount.to_string(),
            completed_jobs,
            disputes_won,
            disputes_lost,
        })
    }
}
