//! Payment proof verification
//!
//! Answers "is this proof authentic and well-formed", never "should we act
//! on it". Runs identically regardless of the settlement router that will be
//! used, performs no network access, and is deterministic for fixed inputs.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::models::{PaymentPayload, PaymentRequirements};
use crate::services::chain::parse_u256;

// EIP-712 domain defaults for USDC-style tokens; overridable per request
// through `PaymentRequirements.extra`.
const DEFAULT_TOKEN_NAME: &str = "USD Coin";
const DEFAULT_TOKEN_VERSION: &str = "2";

sol! {
    /// ERC-3009 typed message, per <https://eips.ethereum.org/EIPS/eip-3009>.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Verification verdict. `invalid_reason` is stable for identical inputs.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
}

impl VerifyOutcome {
    fn valid() -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
        }
    }
}

pub struct ProofVerifier {
    chain_id: u64,
}

impl ProofVerifier {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Validates shape, requirement matching, validity window, and signature
    /// recovery against the declared payer.
    pub fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyOutcome {
        if payload.scheme != requirements.scheme {
            return VerifyOutcome::invalid(format!(
                "scheme mismatch: payload {:?}, requirements {:?}",
                payload.scheme, requirements.scheme
            ));
        }
        if payload.scheme != "exact" {
            return VerifyOutcome::invalid(format!("unsupported scheme {:?}", payload.scheme));
        }
        if payload.network != requirements.network {
            return VerifyOutcome::invalid(format!(
                "network mismatch: payload {:?}, requirements {:?}",
                payload.network, requirements.network
            ));
        }

        let auth = &payload.payload.authorization;

        let from: Address = match auth.from.parse() {
            Ok(a) => a,
            Err(_) => return VerifyOutcome::invalid(format!("invalid payer address {:?}", auth.from)),
        };
        let to: Address = match auth.to.parse() {
            Ok(a) => a,
            Err(_) => return VerifyOutcome::invalid(format!("invalid payee address {:?}", auth.to)),
        };
        let pay_to: Address = match requirements.pay_to.parse() {
            Ok(a) => a,
            Err(_) => {
                return VerifyOutcome::invalid(format!(
                    "invalid payTo address {:?}",
                    requirements.pay_to
                ))
            }
        };
        let token: Address = match requirements.asset.parse() {
            Ok(a) => a,
            Err(_) => {
                return VerifyOutcome::invalid(format!("invalid asset address {:?}", requirements.asset))
            }
        };

        if to != pay_to {
            return VerifyOutcome::invalid(format!(
                "authorization pays {to}, requirements demand {pay_to}"
            ));
        }

        // Same hex/decimal semantics as the routers' amount parsing.
        let value = match parse_u256("authorization.value", &auth.value) {
            Ok(v) => v,
            Err(_) => return VerifyOutcome::invalid(format!("invalid value {:?}", auth.value)),
        };
        let required = match parse_u256("maxAmountRequired", &requirements.max_amount_required) {
            Ok(v) => v,
            Err(_) => {
                return VerifyOutcome::invalid(format!(
                    "invalid maxAmountRequired {:?}",
                    requirements.max_amount_required
                ))
            }
        };
        if value < required {
            return VerifyOutcome::invalid(format!(
                "authorization value {value} below required amount {required}"
            ));
        }

        let now = chrono::Utc::now().timestamp() as u64;
        if auth.valid_before <= now {
            return VerifyOutcome::invalid(format!(
                "authorization expired at {}",
                auth.valid_before
            ));
        }
        if auth.valid_after > now {
            return VerifyOutcome::invalid(format!(
                "authorization not valid until {}",
                auth.valid_after
            ));
        }

        let nonce_bytes = match hex::decode(auth.nonce.trim_start_matches("0x")) {
            Ok(b) if b.len() == 32 => b,
            _ => return VerifyOutcome::invalid(format!("invalid authorization nonce {:?}", auth.nonce)),
        };

        let (name, version) = match &requirements.extra {
            Some(domain) => (domain.name.clone(), domain.version.clone()),
            None => (
                DEFAULT_TOKEN_NAME.to_string(),
                DEFAULT_TOKEN_VERSION.to_string(),
            ),
        };
        let domain = Eip712Domain::new(
            Some(name.into()),
            Some(version.into()),
            Some(U256::from(self.chain_id)),
            Some(token),
            None,
        );

        let message = TransferWithAuthorization {
            from,
            to,
            value,
            validAfter: U256::from(auth.valid_after),
            validBefore: U256::from(auth.valid_before),
            nonce: alloy::primitives::B256::from_slice(&nonce_bytes),
        };
        let digest = message.eip712_signing_hash(&domain);

        let sig_bytes = match hex::decode(payload.payload.signature.trim_start_matches("0x")) {
            Ok(b) => b,
            Err(_) => return VerifyOutcome::invalid("signature is not valid hex".to_string()),
        };
        let signature = match alloy::primitives::Signature::try_from(sig_bytes.as_slice()) {
            Ok(s) => s,
            Err(e) => return VerifyOutcome::invalid(format!("malformed signature: {e}")),
        };

        let recovered = match signature.recover_address_from_prehash(&digest) {
            Ok(a) => a,
            Err(e) => return VerifyOutcome::invalid(format!("signature recovery failed: {e}")),
        };
        if recovered != from {
            return VerifyOutcome::invalid(format!(
                "signature recovered {recovered}, payload declares payer {from}"
            ));
        }

        VerifyOutcome::valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExactEvmPayload, TransferAuthorization};
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;
    use std::collections::BTreeMap;

    const CHAIN_ID: u64 = 84532;
    const TOKEN: &str = "0x0000000000000000000000000000000000000404";
    const SELLER: &str = "0x00000000000000000000000000000000000000aa";

    fn signed_pair(
        signer: &PrivateKeySigner,
        value: &str,
        valid_before: u64,
    ) -> (PaymentPayload, PaymentRequirements) {
        let requirements = PaymentRequirements {
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            pay_to: SELLER.to_string(),
            asset: TOKEN.to_string(),
            max_amount_required: "100".to_string(),
            extra: None,
        };

        let nonce = [0x33u8; 32];
        let message = TransferWithAuthorization {
            from: signer.address(),
            to: SELLER.parse().unwrap(),
            value: U256::from_str_radix(value, 10).unwrap(),
            validAfter: U256::ZERO,
            validBefore: U256::from(valid_before),
            nonce: nonce.into(),
        };
        let domain = Eip712Domain::new(
            Some(DEFAULT_TOKEN_NAME.into()),
            Some(DEFAULT_TOKEN_VERSION.into()),
            Some(U256::from(CHAIN_ID)),
            Some(TOKEN.parse().unwrap()),
            None,
        );
        let signature = signer
            .sign_hash_sync(&message.eip712_signing_hash(&domain))
            .unwrap();

        let payload = PaymentPayload {
            x402_version: 1,
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            payload: ExactEvmPayload {
                signature: format!("0x{}", hex::encode(signature.as_bytes())),
                authorization: TransferAuthorization {
                    from: signer.address().to_string(),
                    to: SELLER.to_string(),
                    value: value.to_string(),
                    valid_after: 0,
                    valid_before,
                    nonce: format!("0x{}", hex::encode(nonce)),
                },
            },
            extensions: BTreeMap::new(),
        };

        (payload, requirements)
    }

    fn far_future() -> u64 {
        chrono::Utc::now().timestamp() as u64 + 3600
    }

    #[test]
    fn valid_payload_verifies() {
        let signer = PrivateKeySigner::random();
        let (payload, requirements) = signed_pair(&signer, "100", far_future());
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(outcome.is_valid, "{:?}", outcome.invalid_reason);
    }

    #[test]
    fn insufficient_value_is_rejected() {
        let signer = PrivateKeySigner::random();
        let (payload, requirements) = signed_pair(&signer, "99", far_future());
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(!outcome.is_valid);
        assert!(outcome.invalid_reason.unwrap().contains("below required"));
    }

    #[test]
    fn expired_authorization_is_rejected() {
        let signer = PrivateKeySigner::random();
        let (payload, requirements) = signed_pair(&signer, "100", 1);
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(!outcome.is_valid);
        assert!(outcome.invalid_reason.unwrap().contains("expired"));
    }

    #[test]
    fn signature_from_wrong_key_is_rejected() {
        let signer = PrivateKeySigner::random();
        let (mut payload, requirements) = signed_pair(&signer, "100", far_future());
        // Declare a different payer than the one who signed.
        payload.payload.authorization.from =
            "0x00000000000000000000000000000000000000bb".to_string();
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(!outcome.is_valid);
    }

    #[test]
    fn rejection_is_stable_across_calls() {
        let signer = PrivateKeySigner::random();
        let (payload, requirements) = signed_pair(&signer, "1", far_future());
        let verifier = ProofVerifier::new(CHAIN_ID);
        let first = verifier.verify(&payload, &requirements);
        let second = verifier.verify(&payload, &requirements);
        assert_eq!(first.invalid_reason, second.invalid_reason);
        assert!(first.invalid_reason.is_some());
    }

    #[test]
    fn hex_prefixed_required_amount_is_read_as_hex() {
        let signer = PrivateKeySigner::random();
        // 0x200 is 512 units; an authorization for 200 must not cover it.
        let (payload, mut requirements) = signed_pair(&signer, "200", far_future());
        requirements.max_amount_required = "0x200".to_string();
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(!outcome.is_valid);
        assert!(outcome.invalid_reason.unwrap().contains("below required"));
    }

    #[test]
    fn scheme_mismatch_reason_names_both_sides() {
        let signer = PrivateKeySigner::random();
        let (mut payload, requirements) = signed_pair(&signer, "100", far_future());
        payload.scheme = "permit2".to_string();
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(!outcome.is_valid);
        let reason = outcome.invalid_reason.unwrap();
        assert!(reason.contains("scheme mismatch"));
        assert!(reason.contains("permit2"));
        assert!(reason.contains("exact"));
    }

    #[test]
    fn payee_mismatch_is_rejected() {
        let signer = PrivateKeySigner::random();
        let (payload, mut requirements) = signed_pair(&signer, "100", far_future());
        requirements.pay_to = "0x00000000000000000000000000000000000000cc".to_string();
        let outcome = ProofVerifier::new(CHAIN_ID).verify(&payload, &requirements);
        assert!(!outcome.is_valid);
        assert!(outcome.invalid_reason.unwrap().contains("demand"));
    }
}
