pub mod chain;
pub mod settlement;
pub mod trust;
pub mod verify;

#[cfg(test)]
pub mod testing {
    //! Mock chain client shared by trust and settlement tests.

    use alloy::primitives::{Address, Log, B256, U256};
    use alloy::sol_types::SolEvent;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::FacilitatorError;
    use crate::services::chain::{
        ChainClient, ICreditFacility, IEscrowBridge, SettlementReceipt, SplitSignature,
    };

    pub struct MockChainClient {
        pub reputation_score: U256,
        pub reputation_tier: u8,
        pub detail: (u64, u64, u64),
        pub stake_tier: u8,
        pub stake_amount: U256,
        pub credit: U256,
        /// Fabricate receipts without the expected result-bearing event.
        pub omit_events: bool,
        /// Fail trust reads once this many have been served (4 per query).
        pub fail_trust_reads_after: Option<usize>,
        pub used_nonces: Mutex<HashSet<B256>>,
        writes: AtomicUsize,
        trust_reads: AtomicUsize,
    }

    impl Default for MockChainClient {
        fn default() -> Self {
            Self {
                reputation_score: U256::from(500),
                reputation_tier: 1,
                detail: (5, 1, 0),
                stake_tier: 2,
                stake_amount: U256::from(1_000_000u64),
                credit: U256::from(1_000_000u64),
                omit_events: false,
                fail_trust_reads_after: None,
                used_nonces: Mutex::new(HashSet::new()),
                writes: AtomicUsize::new(0),
                trust_reads: AtomicUsize::new(0),
            }
        }
    }

    impl MockChainClient {
        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn trust_read(&self) -> Result<(), FacilitatorError> {
            let served = self.trust_reads.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_trust_reads_after {
                if served >= limit {
                    return Err(FacilitatorError::Chain(
                        "reputation registry unavailable".to_string(),
                    ));
                }
            }
            Ok(())
        }

        fn receipt(&self, logs: Vec<Log>) -> SettlementReceipt {
            SettlementReceipt {
                tx_hash: B256::repeat_byte(0xab),
                logs: if self.omit_events { Vec::new() } else { logs },
            }
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn block_number(&self) -> Result<u64, FacilitatorError> {
            Ok(12_345_678)
        }

        async fn reputation_of(&self, _seller: Address) -> Result<(U256, u8), FacilitatorError> {
            self.trust_read()?;
            Ok((self.reputation_score, self.reputation_tier))
        }

        async fn reputation_detail(
            &self,
            _seller: Address,
        ) -> Result<(u64, u64, u64), FacilitatorError> {
            self.trust_read()?;
            Ok(self.detail)
        }

        async fn stake_tier_of(&self, _seller: Address) -> Result<u8, FacilitatorError> {
            self.trust_read()?;
            Ok(self.stake_tier)
        }

        async fn stake_of(&self, _seller: Address) -> Result<U256, FacilitatorError> {
            self.trust_read()?;
            Ok(self.stake_amount)
        }

        async fn intent_nonce_used(&self, nonce: B256) -> Result<bool, FacilitatorError> {
            Ok(self.used_nonces.lock().unwrap().contains(&nonce))
        }

        async fn available_credit(&self, _agent: Address) -> Result<U256, FacilitatorError> {
            Ok(self.credit)
        }

        async fn submit_payment_intent(
            &self,
            intent: IEscrowBridge::PaymentIntent,
            _sig: SplitSignature,
        ) -> Result<SettlementReceipt, FacilitatorError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.used_nonces.lock().unwrap().insert(intent.nonce);
            let event = IEscrowBridge::JobCreated {
                jobId: B256::repeat_byte(0x42),
                listingId: intent.listingId,
                seller: intent.seller,
                payer: intent.payer,
                amount: intent.amount,
            };
            Ok(self.receipt(vec![Log {
                address: Address::ZERO,
                data: event.encode_log_data(),
            }]))
        }

        async fn submit_intent_with_authorization(
            &self,
            _auth: IEscrowBridge::Erc3009Authorization,
            _auth_sig: SplitSignature,
            intent: IEscrowBridge::PaymentIntent,
            sig: SplitSignature,
        ) -> Result<SettlementReceipt, FacilitatorError> {
            self.submit_payment_intent(intent, sig).await
        }

        async fn draw_credit(
            &self,
            agent: Address,
            _listing_id: B256,
            _seller: Address,
            amount: U256,
        ) -> Result<SettlementReceipt, FacilitatorError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let event = ICreditFacility::CreditDrawn {
                drawId: B256::repeat_byte(0x11),
                jobId: B256::repeat_byte(0x22),
                agent,
                amount,
            };
            Ok(self.receipt(vec![Log {
                address: Address::ZERO,
                data: event.encode_log_data(),
            }]))
        }

        async fn transfer_with_authorization(
            &self,
            _token: Address,
            _from: Address,
            _to: Address,
            _value: U256,
            _valid_after: U256,
            _valid_before: U256,
            _nonce: B256,
            _sig: SplitSignature,
        ) -> Result<SettlementReceipt, FacilitatorError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(SettlementReceipt {
                tx_hash: B256::repeat_byte(0xcd),
                logs: Vec::new(),
            })
        }
    }
}
