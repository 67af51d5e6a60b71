//! Invoice entity.
//!
//! One invoice per registration-to-be-paid. Created together with its
//! installments and tickets, never deleted, and mutated only by the
//! status aggregator.

use crate::domain::foundation::{EventId, InvoiceId, Money, PersonId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use super::{Installment, InvoiceStatus, Payment, Ticket};

/// Invoice header.
///
/// # Invariants
///
/// - `total_amount` equals the sum of the installment amounts at creation
///   and never changes afterwards
/// - `number` is globally unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,

    /// Human-readable, year-scoped number (e.g. `INV-2026-000042`).
    pub number: String,

    pub person_id: PersonId,
    pub event_id: EventId,
    pub total_amount: Money,
    pub status: InvoiceStatus,

    /// Staff member who generated the invoice.
    pub created_by: UserId,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Invoice {
    /// Applies a recomputed aggregate status.
    ///
    /// Returns true when the status actually changed.
    pub fn apply_status(&mut self, status: InvoiceStatus, now: Timestamp) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}

/// An installment together with its payment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentWithPayments {
    pub installment: Installment,
    pub payments: Vec<Payment>,
}

/// Full invoice graph as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceGraph {
    pub invoice: Invoice,
    pub installments: Vec<InstallmentWithPayments>,
    pub tickets: Vec<Ticket>,
}

impl InvoiceGraph {
    /// Sum of the installment amounts.
    pub fn installments_total(&self) -> Money {
        Money::sum(self.installments.iter().map(|i| &i.installment.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> Invoice {
        let now = Timestamp::now();
        Invoice {
            id: InvoiceId::new(),
            number: "INV-2026-000001".to_string(),
            person_id: PersonId::new(),
            event_id: EventId::new(),
            total_amount: Money::from_cents(18_000).unwrap(),
            status: InvoiceStatus::Pending,
            created_by: UserId::new("staff-1").unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn apply_status_reports_change() {
        let mut invoice = invoice();
        let later = invoice.created_at.add_days(1);

        assert!(invoice.apply_status(InvoiceStatus::Paid, later));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.updated_at, later);
    }

    #[test]
    fn apply_same_status_is_noop() {
        let mut invoice = invoice();
        let before = invoice.updated_at;

        assert!(!invoice.apply_status(InvoiceStatus::Pending, before.add_days(1)));
        assert_eq!(invoice.updated_at, before);
    }
}
