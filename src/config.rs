//! Configuration management

use anyhow::{Context, Result};
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub chain_id: u64,
    pub network: String,
    pub rpc_url: String,
    pub private_key: Option<String>,
    pub escrow_bridge_address: String,
    pub credit_facility_address: String,
    pub reputation_address: String,
    pub staking_address: String,
    /// Sellers below this reputation score are refused settlement.
    pub min_reputation_score: u64,
    /// When set, sellers without an active stake are refused settlement.
    pub require_active_stake: bool,
    pub receipt_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "84532".to_string()) // Base Sepolia
                .parse()
                .context("Invalid CHAIN_ID")?,

            network: env::var("NETWORK").unwrap_or_else(|_| "base-sepolia".to_string()),

            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://sepolia.base.org".to_string()),

            private_key: env::var("FACILITATOR_PRIVATE_KEY").ok(),

            escrow_bridge_address: env::var("ESCROW_BRIDGE_ADDRESS")
                .context("ESCROW_BRIDGE_ADDRESS is required")?,

            credit_facility_address: env::var("CREDIT_FACILITY_ADDRESS")
                .context("CREDIT_FACILITY_ADDRESS is required")?,

            reputation_address: env::var("REPUTATION_ADDRESS")
                .context("REPUTATION_ADDRESS is required")?,

            staking_address: env::var("STAKING_ADDRESS")
                .context("STAKING_ADDRESS is required")?,

            min_reputation_score: env::var("MIN_REPUTATION_SCORE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid MIN_REPUTATION_SCORE")?,

            require_active_stake: env::var("REQUIRE_ACTIVE_STAKE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid REQUIRE_ACTIVE_STAKE")?,

            receipt_timeout_secs: env::var("RECEIPT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid RECEIPT_TIMEOUT_SECS")?,
        })
    }
}
