//! Webhook verification and decoding errors.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::billing::BillingError;

/// Errors raised before a gateway event reaches the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Signature did not match the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp is older than the configured tolerance.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signature timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// The signature header is missing or malformed.
    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    /// The authenticated payload is not a valid event envelope.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl WebhookError {
    /// True when the request could not be authenticated. Such requests
    /// are rejected and must not change any state.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
                | WebhookError::MalformedHeader(_)
        )
    }

    /// Redelivery of the same bytes can never succeed for any of these.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Maps the error to the status returned to the gateway.
    ///
    /// - 400: authenticity failures, no state change
    /// - 200: authentic but undecodable, acknowledged so the gateway stops retrying
    pub fn status_code(&self) -> StatusCode {
        if self.is_authentication_failure() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }
}

impl From<WebhookError> for BillingError {
    fn from(err: WebhookError) -> Self {
        if err.is_authentication_failure() {
            BillingError::InvalidSignature
        } else {
            BillingError::validation("payload", err.to_string())
        }
    }
}
