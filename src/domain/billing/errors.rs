//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | NotFound | 404 |
//! | Conflict | 409 |
//! | AlreadySettled | 400 |
//! | AlreadyCancelled | 409 |
//! | InvalidSignature | 400 |
//! | Internal | 500 |

use thiserror::Error;

use crate::domain::foundation::{
    DomainError, ErrorCode, InstallmentId, PaymentId, ValidationError,
};

use super::PaymentStatus;

/// Errors surfaced by billing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Malformed or missing input. Client-fixable.
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Numbering collision or a concurrent write won the race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The installment is already settled by a different payment.
    #[error("Installment {installment_id} is already paid by payment {payment_id}")]
    AlreadySettled {
        installment_id: InstallmentId,
        payment_id: PaymentId,
    },

    /// The payment was already cancelled or refunded.
    #[error("Payment {payment_id} is already {status}")]
    AlreadyCancelled {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    /// Webhook authenticity check failed.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Transaction or infrastructure failure. Safe to retry.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BillingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BillingError::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BillingError::Internal(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation { .. } => "VALIDATION_FAILED",
            BillingError::NotFound { .. } => "NOT_FOUND",
            BillingError::Conflict(_) => "CONFLICT",
            BillingError::AlreadySettled { .. } => "ALREADY_SETTLED",
            BillingError::AlreadyCancelled { .. } => "ALREADY_CANCELLED",
            BillingError::InvalidSignature => "INVALID_SIGNATURE",
            BillingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the caller may simply retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Internal(_) | BillingError::Conflict(_))
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => BillingError::Validation {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::PersonNotFound => not_found_from("Person", err),
            ErrorCode::EventNotFound => not_found_from("Event", err),
            ErrorCode::InvoiceNotFound => not_found_from("Invoice", err),
            ErrorCode::InstallmentNotFound => not_found_from("Installment", err),
            ErrorCode::PaymentNotFound => not_found_from("Payment", err),
            ErrorCode::Conflict => BillingError::Conflict(err.message),
            _ => BillingError::Internal(err.to_string()),
        }
    }
}

fn not_found_from(entity: &'static str, err: DomainError) -> BillingError {
    let id = err.details.get("id").cloned().unwrap_or(err.message);
    BillingError::NotFound { entity, id }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        let installment_id = InstallmentId::new();
        let payment_id = PaymentId::new();
        let err = BillingError::AlreadySettled {
            installment_id,
            payment_id,
        };
        assert_eq!(
            err.to_string(),
            format!(
                "Installment {} is already paid by payment {}",
                installment_id, payment_id
            )
        );

        let err = BillingError::AlreadyCancelled {
            payment_id,
            status: PaymentStatus::Refunded,
        };
        assert_eq!(err.to_string(), format!("Payment {} is already REFUNDED", payment_id));
    }

    #[test]
    fn domain_not_found_maps_to_entity() {
        let id = InstallmentId::new();
        let domain = DomainError::new(ErrorCode::InstallmentNotFound, "missing")
            .with_detail("id", id.to_string());

        let err: BillingError = domain.into();

        assert_eq!(err, BillingError::not_found("Installment", id));
    }

    #[test]
    fn domain_conflict_maps_to_conflict() {
        let err: BillingError = DomainError::new(ErrorCode::Conflict, "number taken").into();
        assert_eq!(err, BillingError::conflict("number taken"));
        assert!(err.is_retryable());
    }

    #[test]
    fn domain_validation_keeps_field() {
        let err: BillingError = DomainError::validation("amount", "bad").into();
        assert_eq!(err, BillingError::validation("amount", "bad"));
    }

    #[test]
    fn database_errors_become_internal() {
        let err: BillingError = DomainError::new(ErrorCode::DatabaseError, "deadlock").into();
        assert!(matches!(err, BillingError::Internal(_)));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn validation_error_converts() {
        let err: BillingError = ValidationError::empty_field("ticketType").into();
        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "ticketType"));
        assert!(!err.is_retryable());
    }
}
