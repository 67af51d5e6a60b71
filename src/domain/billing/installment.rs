//! Installment entity.

use crate::domain::foundation::{
    DomainError, ErrorCode, InstallmentId, InvoiceId, Money, StateMachine, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::InstallmentStatus;

/// One scheduled share of an invoice, numbered 1..N.
///
/// # Invariants
///
/// - `status == Paid` iff exactly one owned payment is `Paid`
/// - `paid_at` is set iff `status == Paid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub invoice_id: InvoiceId,

    /// Position in the schedule, starting at 1.
    pub number: u32,

    pub amount: Money,
    pub due_at: Timestamp,
    pub status: InstallmentStatus,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Installment {
    /// Settles the installment.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the installment is pending or overdue.
    pub fn mark_paid(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(InstallmentStatus::Paid)?;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Rolls a settled installment back to pending after its payment was
    /// cancelled or refunded.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the installment is paid.
    pub fn reopen(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(InstallmentStatus::Pending)?;
        self.paid_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Flags a pending installment whose due date has passed.
    ///
    /// Returns false (and changes nothing) when the installment is not
    /// pending or not yet due.
    pub fn mark_overdue_if_due(&mut self, now: Timestamp) -> bool {
        if self.status != InstallmentStatus::Pending || !self.due_at.is_before(&now) {
            return false;
        }
        self.status = InstallmentStatus::Overdue;
        self.updated_at = now;
        true
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    fn transition_to(&mut self, target: InstallmentStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition installment {} from {} to {}",
                    self.id, self.status, target
                ),
            )
        })?;
        Ok(())
    }
}
