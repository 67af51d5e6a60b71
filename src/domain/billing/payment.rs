//! Payment entity: a single settlement attempt against one installment.

use crate::domain::foundation::{
    DomainError, ErrorCode, InstallmentId, Money, PaymentId, StateMachine, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,

    /// Human-readable number (e.g. `PAY-2026-000007`).
    pub number: String,

    pub installment_id: InstallmentId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,

    /// Gateway payment reference (payment intent id, or a manual transaction id).
    pub external_payment_ref: Option<String>,

    /// Gateway charge reference, used to match refunds.
    pub external_charge_ref: Option<String>,

    pub note: Option<String>,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields describing a new settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub number: String,
    pub installment_id: InstallmentId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub external_payment_ref: Option<String>,
    pub external_charge_ref: Option<String>,
    pub note: Option<String>,
}

impl Payment {
    /// Creates a payment already confirmed as PAID.
    pub fn paid(new: NewPayment, now: Timestamp) -> Self {
        let mut payment = Self::from_new(new, PaymentStatus::Paid, now);
        payment.paid_at = Some(now);
        payment
    }

    /// Creates a payment awaiting gateway confirmation.
    pub fn pending(new: NewPayment, now: Timestamp) -> Self {
        Self::from_new(new, PaymentStatus::Pending, now)
    }

    fn from_new(new: NewPayment, status: PaymentStatus, now: Timestamp) -> Self {
        Self {
            id: PaymentId::new(),
            number: new.number,
            installment_id: new.installment_id,
            amount: new.amount,
            method: new.method,
            status,
            external_payment_ref: new.external_payment_ref,
            external_charge_ref: new.external_charge_ref,
            note: new.note,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Promotes an open attempt to PAID, keeping the first known charge reference.
    pub fn mark_paid(
        &mut self,
        charge_ref: Option<String>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.transition_to(PaymentStatus::Paid)?;
        if self.external_charge_ref.is_none() {
            self.external_charge_ref = charge_ref;
        }
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed attempt reported by the gateway.
    pub fn mark_failed(&mut self, reason: Option<String>, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(PaymentStatus::Failed)?;
        if let Some(reason) = reason {
            self.note = Some(reason);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Staff cancellation of a confirmed payment.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(PaymentStatus::Cancelled)?;
        self.updated_at = now;
        Ok(())
    }

    /// Gateway-driven reversal.
    pub fn refund(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(PaymentStatus::Refunded)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// True when this payment carries the given gateway payment reference.
    pub fn has_payment_ref(&self, reference: &str) -> bool {
        self.external_payment_ref.as_deref() == Some(reference)
    }

    fn transition_to(&mut self, target: PaymentStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition payment {} from {} to {}",
                    self.id, self.status, target
                ),
            )
        })?;
        Ok(())
    }
}
