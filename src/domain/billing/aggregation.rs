//! Invoice status aggregation.
//!
//! A pure decision over the installment snapshot. Callers apply the result
//! to the invoice and its tickets inside the same transaction that changed
//! the installments.

use super::{InstallmentStatus, InvoiceStatus};

/// What happens to an invoice's tickets after recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAction {
    /// Every PENDING ticket becomes ACTIVE.
    ActivateAll,
    /// Tickets keep their current status.
    Leave,
    /// Every ACTIVE ticket goes back to PENDING.
    DeactivateAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub status: InvoiceStatus,
    pub tickets: TicketAction,
}

/// Derives the invoice status and ticket action from installment statuses.
///
/// `previous` is the invoice status before the change being applied.
///
/// Cancelled (waived) installments do not count towards "all paid". An
/// invoice with nothing but waived installments is treated as unpaid.
/// Partially paid invoices leave tickets untouched so they do not flap
/// while payments come in. An invoice dropping out of `PAID` deactivates
/// its tickets.
pub fn aggregate(previous: InvoiceStatus, installments: &[InstallmentStatus]) -> Aggregate {
    let billable = installments
        .iter()
        .filter(|s| **s != InstallmentStatus::Cancelled);
    let total = billable.clone().count();
    let paid = billable
        .filter(|s| **s == InstallmentStatus::Paid)
        .count();

    if total > 0 && paid == total {
        Aggregate {
            status: InvoiceStatus::Paid,
            tickets: TicketAction::ActivateAll,
        }
    } else if paid > 0 {
        let tickets = if previous == InvoiceStatus::Paid {
            TicketAction::DeactivateAll
        } else {
            TicketAction::Leave
        };
        Aggregate {
            status: InvoiceStatus::PartiallyPaid,
            tickets,
        }
    } else {
        Aggregate {
            status: InvoiceStatus::Pending,
            tickets: TicketAction::DeactivateAll,
        }
    }
}
