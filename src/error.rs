//! Error types for the settlement facilitator
//!
//! Every variant is terminal for the request it occurs in: the facilitator
//! performs no local recovery or retry. Retry policy belongs to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacilitatorError {
    /// Missing or unparseable request fields; rejected before verification
    /// or any on-chain access.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Payment proof failed verification; no chain interaction occurred.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Seller did not meet the configured trust thresholds.
    #[error("Admission rejected: {0}")]
    AdmissionRejected(String),

    /// A pre-submission read showed the transaction was doomed (nonce
    /// already used, insufficient credit); nothing was submitted.
    #[error("Pre-check failed: {0}")]
    Precheck(String),

    /// The RPC write itself errored before the transaction was accepted.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The transaction may have reached the chain but its outcome could not
    /// be confirmed, or it confirmed without the expected result-bearing
    /// event. Requires manual reconciliation; must never be retried blindly.
    #[error("Ambiguous settlement outcome: {0}")]
    AmbiguousOutcome(String),

    /// A read-only RPC call failed.
    #[error("Chain error: {0}")]
    Chain(String),
}

impl IntoResponse for FacilitatorError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            FacilitatorError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            FacilitatorError::Verification(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            FacilitatorError::AdmissionRejected(_) => (StatusCode::FORBIDDEN, self.to_string()),
            FacilitatorError::Precheck(_) => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            FacilitatorError::Submission(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            FacilitatorError::AmbiguousOutcome(_) => (StatusCode::CONFLICT, self.to_string()),
            FacilitatorError::Chain(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
