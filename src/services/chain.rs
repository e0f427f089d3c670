//! Chain client adapter for Base L2 interaction
//!
//! Wraps a read-only RPC provider plus a single signing account used for all
//! settlement writes. Routers depend on the [`ChainClient`] trait so tests can
//! substitute a mock; [`OnchainClient`] is the production implementation.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Log, Signature, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    signers::local::PrivateKeySigner,
    sol,
    transports::http::{Client, Http},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::FacilitatorError;

sol! {
    /// Escrow bridge: converts a signed payment intent into an escrowed job.
    ///
    /// `submitPaymentIntent` pulls funds via a prior allowance (mode A);
    /// `submitPaymentIntentWithAuthorization` additionally carries an
    /// ERC-3009 authorization so no prior approval is needed (mode B).
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEscrowBridge {
        struct PaymentIntent {
            bytes32 nonce;
            address payer;
            address token;
            uint256 amount;
            bytes32 listingId;
            address seller;
            uint256 deadline;
        }

        struct Erc3009Authorization {
            address from;
            address token;
            uint256 amount;
            uint256 validAfter;
            uint256 validBefore;
            bytes32 nonce;
        }

        function usedNonces(bytes32 nonce) external view returns (bool);

        function submitPaymentIntent(
            PaymentIntent calldata intent,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external returns (bytes32 jobId);

        function submitPaymentIntentWithAuthorization(
            Erc3009Authorization calldata auth,
            uint8 authV,
            bytes32 authR,
            bytes32 authS,
            PaymentIntent calldata intent,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external returns (bytes32 jobId);

        event JobCreated(
            bytes32 indexed jobId,
            bytes32 indexed listingId,
            address indexed seller,
            address payer,
            uint256 amount
        );
    }
}

sol! {
    /// Credit facility: operator-initiated draws against an agent's
    /// pre-established credit line.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface ICreditFacility {
        function getAvailableCredit(address agent) external view returns (uint256);

        function drawCreditForAgent(
            address agent,
            bytes32 listingId,
            address seller,
            uint256 amount
        ) external returns (bytes32 drawId);

        event CreditDrawn(
            bytes32 indexed drawId,
            bytes32 indexed jobId,
            address indexed agent,
            uint256 amount
        );
    }
}

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IReputationRegistry {
        function reputationOf(address seller) external view returns (uint256 score, uint8 tier);
        function getReputationDetail(address seller)
            external
            view
            returns (uint64 completedJobs, uint64 disputesWon, uint64 disputesLost);
    }
}

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface ISellerStaking {
        function stakeTierOf(address seller) external view returns (uint8);
        function stakeOf(address seller) external view returns (uint256);
    }
}

sol! {
    /// Minimal ERC-3009 surface for direct same-chain settlement.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IErc3009Token {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}

/// Split ECDSA signature components as the contracts expect them.
#[derive(Debug, Clone, Copy)]
pub struct SplitSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl From<&Signature> for SplitSignature {
    fn from(sig: &Signature) -> Self {
        Self {
            v: 27 + sig.v().y_parity_byte(),
            r: B256::from(sig.r().to_be_bytes::<32>()),
            s: B256::from(sig.s().to_be_bytes::<32>()),
        }
    }
}

/// Mined-transaction outcome handed back to routers: the hash plus the raw
/// logs, so each router owns its own result-event scan.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub tx_hash: B256,
    pub logs: Vec<Log>,
}

/// Typed chain operations the facilitator needs.
///
/// Reads are safe to issue concurrently; implementations must serialize
/// transaction submission because one signing account backs every write.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, FacilitatorError>;

    /// Reputation score and tier index for a seller.
    async fn reputation_of(&self, seller: Address) -> Result<(U256, u8), FacilitatorError>;

    /// Completed jobs, disputes won, disputes lost.
    async fn reputation_detail(&self, seller: Address) -> Result<(u64, u64, u64), FacilitatorError>;

    async fn stake_tier_of(&self, seller: Address) -> Result<u8, FacilitatorError>;

    async fn stake_of(&self, seller: Address) -> Result<U256, FacilitatorError>;

    /// Whether a payment-intent nonce is already in the bridge's used set.
    async fn intent_nonce_used(&self, nonce: B256) -> Result<bool, FacilitatorError>;

    async fn available_credit(&self, agent: Address) -> Result<U256, FacilitatorError>;

    async fn submit_payment_intent(
        &self,
        intent: IEscrowBridge::PaymentIntent,
        sig: SplitSignature,
    ) -> Result<SettlementReceipt, FacilitatorError>;

    async fn submit_intent_with_authorization(
        &self,
        auth: IEscrowBridge::Erc3009Authorization,
        auth_sig: SplitSignature,
        intent: IEscrowBridge::PaymentIntent,
        sig: SplitSignature,
    ) -> Result<SettlementReceipt, FacilitatorError>;

    async fn draw_credit(
        &self,
        agent: Address,
        listing_id: B256,
        seller: Address,
        amount: U256,
    ) -> Result<SettlementReceipt, FacilitatorError>;

    #[allow(clippy::too_many_arguments)]
    async fn transfer_with_authorization(
        &self,
        token: Address,
        from: Address,
        to: Address,
        value: U256,
        valid_after: U256,
        valid_before: U256,
        nonce: B256,
        sig: SplitSignature,
    ) -> Result<SettlementReceipt, FacilitatorError>;
}

/// Production chain client backed by alloy.
pub struct OnchainClient {
    provider: Arc<RootProvider<Http<Client>>>,
    wallet: Option<EthereumWallet>,
    rpc_url: String,
    escrow_bridge: Address,
    credit_facility: Address,
    reputation: Address,
    staking: Address,
    receipt_timeout: Duration,
    /// One account nonce stream feeds every write; submission is serialized
    /// here so concurrent requests cannot collide at the RPC layer.
    submit_lock: tokio::sync::Mutex<()>,
}

impl OnchainClient {
    pub async fn new(config: &Config) -> Result<Self> {
        let escrow_bridge: Address = config
            .escrow_bridge_address
            .parse()
            .context("Invalid escrow bridge address")?;

        let credit_facility: Address = config
            .credit_facility_address
            .parse()
            .context("Invalid credit facility address")?;

        let reputation: Address = config
            .reputation_address
            .parse()
            .context("Invalid reputation registry address")?;

        let staking: Address = config
            .staking_address
            .parse()
            .context("Invalid staking address")?;

        let provider = ProviderBuilder::new()
            .on_http(config.rpc_url.parse().context("Invalid RPC URL")?);

        let wallet = if let Some(ref pk) = config.private_key {
            let signer: PrivateKeySigner = pk.parse().context("Invalid facilitator private key")?;
            Some(EthereumWallet::from(signer))
        } else {
            None
        };

        Ok(Self {
            provider: Arc::new(provider),
            wallet,
            rpc_url: config.rpc_url.clone(),
            escrow_bridge,
            credit_facility,
            reputation,
            staking,
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            submit_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn wallet(&self) -> Result<&EthereumWallet, FacilitatorError> {
        self.wallet.as_ref().ok_or_else(|| {
            FacilitatorError::Submission("no facilitator signing key configured".to_string())
        })
    }

    /// Waits for the receipt of an already-submitted transaction.
    async fn finalize(
        &self,
        pending: alloy::providers::PendingTransactionBuilder<'_, Http<Client>, alloy::network::Ethereum>,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let receipt = await_receipt(self.receipt_timeout, pending.get_receipt()).await?;

        Ok(SettlementReceipt {
            tx_hash: receipt.transaction_hash,
            logs: receipt.inner.logs().iter().map(|l| l.inner.clone()).collect(),
        })
    }
}

/// Bounds the wait for an already-submitted transaction's receipt.
///
/// The transaction may be on chain by the time anything here fails, so both
/// the timeout and a receipt error surface as ambiguous outcomes, never as
/// retryable submission failures.
async fn await_receipt<T, E, F>(timeout: Duration, receipt: F) -> Result<T, FacilitatorError>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, receipt).await {
        Err(_) => Err(FacilitatorError::AmbiguousOutcome(format!(
            "timed out after {}s waiting for transaction receipt",
            timeout.as_secs()
        ))),
        Ok(Err(e)) => Err(FacilitatorError::AmbiguousOutcome(format!(
            "transaction submitted but receipt could not be confirmed: {e}"
        ))),
        Ok(Ok(receipt)) => Ok(receipt),
    }
}

fn chain_err(e: impl std::fmt::Display) -> FacilitatorError {
    FacilitatorError::Chain(e.to_string())
}

fn submit_err(e: impl std::fmt::Display) -> FacilitatorError {
    FacilitatorError::Submission(e.to_string())
}

#[async_trait]
impl ChainClient for OnchainClient {
    async fn block_number(&self) -> Result<u64, FacilitatorError> {
        self.provider.get_block_number().await.map_err(chain_err)
    }

    async fn reputation_of(&self, seller: Address) -> Result<(U256, u8), FacilitatorError> {
        let contract = IReputationRegistry::new(self.reputation, &*self.provider);
        let ret = contract.reputationOf(seller).call().await.map_err(chain_err)?;
        Ok((ret.score, ret.tier))
    }

    async fn reputation_detail(&self, seller: Address) -> Result<(u64, u64, u64), FacilitatorError> {
        let contract = IReputationRegistry::new(self.reputation, &*self.provider);
        let ret = contract
            .getReputationDetail(seller)
            .call()
            .await
            .map_err(chain_err)?;
        Ok((ret.completedJobs, ret.disputesWon, ret.disputesLost))
    }

    async fn stake_tier_of(&self, seller: Address) -> Result<u8, FacilitatorError> {
        let contract = ISellerStaking::new(self.staking, &*self.provider);
        Ok(contract.stakeTierOf(seller).call().await.map_err(chain_err)?._0)
    }

    async fn stake_of(&self, seller: Address) -> Result<U256, FacilitatorError> {
        let contract = ISellerStaking::new(self.staking, &*self.provider);
        Ok(contract.stakeOf(seller).call().await.map_err(chain_err)?._0)
    }

    async fn intent_nonce_used(&self, nonce: B256) -> Result<bool, FacilitatorError> {
        let contract = IEscrowBridge::new(self.escrow_bridge, &*self.provider);
        Ok(contract.usedNonces(nonce).call().await.map_err(chain_err)?._0)
    }

    async fn available_credit(&self, agent: Address) -> Result<U256, FacilitatorError> {
        let contract = ICreditFacility::new(self.credit_facility, &*self.provider);
        Ok(contract
            .getAvailableCredit(agent)
            .call()
            .await
            .map_err(chain_err)?
            ._0)
    }

    async fn submit_payment_intent(
        &self,
        intent: IEscrowBridge::PaymentIntent,
        sig: SplitSignature,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let wallet = self.wallet()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.parse().map_err(chain_err)?);

        let contract = IEscrowBridge::new(self.escrow_bridge, &provider);
        let call = contract.submitPaymentIntent(intent, sig.v, sig.r, sig.s);

        let pending = {
            let _guard = self.submit_lock.lock().await;
            call.send().await.map_err(submit_err)?
        };

        self.finalize(pending).await
    }

    async fn submit_intent_with_authorization(
        &self,
        auth: IEscrowBridge::Erc3009Authorization,
        auth_sig: SplitSignature,
        intent: IEscrowBridge::PaymentIntent,
        sig: SplitSignature,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let wallet = self.wallet()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.parse().map_err(chain_err)?);

        let contract = IEscrowBridge::new(self.escrow_bridge, &provider);
        let call = contract.submitPaymentIntentWithAuthorization(
            auth, auth_sig.v, auth_sig.r, auth_sig.s, intent, sig.v, sig.r, sig.s,
        );

        let pending = {
            let _guard = self.submit_lock.lock().await;
            call.send().await.map_err(submit_err)?
        };

        self.finalize(pending).await
    }

    async fn draw_credit(
        &self,
        agent: Address,
        listing_id: B256,
        seller: Address,
        amount: U256,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let wallet = self.wallet()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.parse().map_err(chain_err)?);

        let contract = ICreditFacility::new(self.credit_facility, &provider);
        let call = contract.drawCreditForAgent(agent, listing_id, seller, amount);

        let pending = {
            let _guard = self.submit_lock.lock().await;
            call.send().await.map_err(submit_err)?
        };

        self.finalize(pending).await
    }

    async fn transfer_with_authorization(
        &self,
        token: Address,
        from: Address,
        to: Address,
        value: U256,
        valid_after: U256,
        valid_before: U256,
        nonce: B256,
        sig: SplitSignature,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let wallet = self.wallet()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.parse().map_err(chain_err)?);

        let contract = IErc3009Token::new(token, &provider);
        let call = contract.transferWithAuthorization(
            from, to, value, valid_after, valid_before, nonce, sig.v, sig.r, sig.s,
        );

        let pending = {
            let _guard = self.submit_lock.lock().await;
            call.send().await.map_err(submit_err)?
        };

        self.finalize(pending).await
    }
}

/// Parses a hex address from a request field.
pub fn parse_address(label: &str, s: &str) -> Result<Address, FacilitatorError> {
    s.parse()
        .map_err(|_| FacilitatorError::BadRequest(format!("{label}: invalid address {s:?}")))
}

/// Parses a 32-byte hex value (intent nonces, listing ids).
pub fn parse_b256(label: &str, s: &str) -> Result<B256, FacilitatorError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| FacilitatorError::BadRequest(format!("{label}: invalid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(FacilitatorError::BadRequest(format!(
            "{label}: expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Parses an atomic token amount, decimal by default, hex with `0x`.
pub fn parse_u256(label: &str, s: &str) -> Result<U256, FacilitatorError> {
    let parsed = match s.strip_prefix("0x") {
        Some(h) => U256::from_str_radix(h, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|e| FacilitatorError::BadRequest(format!("{label}: invalid amount {s:?}: {e}")))
}

/// Parses a 65-byte hex ECDSA signature.
pub fn parse_signature(label: &str, s: &str) -> Result<Signature, FacilitatorError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| FacilitatorError::BadRequest(format!("{label}: invalid hex signature: {e}")))?;
    Signature::try_from(bytes.as_slice())
        .map_err(|e| FacilitatorError::BadRequest(format!("{label}: invalid signature: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u256_accepts_decimal_and_hex() {
        assert_eq!(parse_u256("amount", "100").unwrap(), U256::from(100));
        assert_eq!(parse_u256("amount", "0xff").unwrap(), U256::from(255));
        assert!(parse_u256("amount", "12x").is_err());
    }

    #[test]
    fn parse_b256_rejects_wrong_length() {
        let ok = parse_b256("nonce", &format!("0x{}", "11".repeat(32)));
        assert!(ok.is_ok());
        let err = parse_b256("nonce", "0x1234").unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes"));
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_timeout_is_an_ambiguous_outcome() {
        let err = await_receipt(
            Duration::from_secs(60),
            std::future::pending::<Result<(), String>>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FacilitatorError::AmbiguousOutcome(_)));
        assert!(err.to_string().contains("timed out after 60s"));
    }

    #[tokio::test]
    async fn receipt_error_after_send_is_an_ambiguous_outcome() {
        let err = await_receipt(Duration::from_secs(60), async {
            Err::<(), _>("connection reset".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, FacilitatorError::AmbiguousOutcome(_)));
        assert!(err.to_string().contains("could not be confirmed"));
    }

    #[tokio::test]
    async fn confirmed_receipt_passes_through() {
        let receipt = await_receipt(Duration::from_secs(60), async { Ok::<_, String>(7u64) })
            .await
            .unwrap();
        assert_eq!(receipt, 7);
    }

    #[test]
    fn split_signature_normalizes_parity() {
        let sig = Signature::try_from(
            [
                [0x11u8; 32].as_slice(),
                [0x22u8; 32].as_slice(),
                [0x1bu8; 1].as_slice(),
            ]
            .concat()
            .as_slice(),
        )
        .unwrap();
        let split = SplitSignature::from(&sig);
        assert!(split.v == 27 || split.v == 28);
        assert_eq!(split.r, B256::from([0x11u8; 32]));
    }
}
