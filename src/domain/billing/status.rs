//! Billing status types and their allowed transitions.
//!
//! `InvoiceStatus` is never transitioned directly: it is derived from the
//! installment snapshot by [`super::aggregation::aggregate`]. The other
//! statuses are state machines guarded by [`StateMachine`].

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate payment state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
}

/// Installment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    /// Awaiting settlement.
    Pending,
    /// Settled by exactly one PAID payment.
    Paid,
    /// Past its due date without settlement (set by the external sweep).
    Overdue,
    /// Waived by staff. Terminal.
    Cancelled,
}

impl InstallmentStatus {
    /// Statuses from which a payment may settle the installment.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, InstallmentStatus::Pending | InstallmentStatus::Overdue)
    }
}

impl StateMachine for InstallmentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use InstallmentStatus::*;
        matches!(
            (self, target),
            (Pending, Paid)
                | (Pending, Overdue)
                | (Pending, Cancelled)
                | (Overdue, Paid)
                | (Overdue, Cancelled)
                // Rollback after cancellation or refund of the settling payment
                | (Paid, Pending)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use InstallmentStatus::*;
        match self {
            Pending => vec![Paid, Overdue, Cancelled],
            Overdue => vec![Paid, Cancelled],
            Paid => vec![Pending],
            Cancelled => vec![],
        }
    }
}

/// How a payment was (or will be) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    DebitCard,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    /// Methods the external gateway can collect.
    pub fn is_gateway_supported(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Pix | PaymentMethod::CreditCard | PaymentMethod::DebitCard
        )
    }
}

/// Settlement attempt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Not yet settled, and still able to become PAID.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed
        )
    }

    /// Reversed by staff or by the gateway.
    pub fn is_reversed(&self) -> bool {
        matches!(self, PaymentStatus::Refunded | PaymentStatus::Cancelled)
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Processing, Paid, Failed, Cancelled, Refunded],
            Processing => vec![Paid, Failed, Cancelled, Refunded],
            // A retried intent may still succeed after a failed attempt
            Failed => vec![Paid, Refunded],
            Paid => vec![Cancelled, Refunded],
            Refunded | Cancelled => vec![],
        }
    }
}

/// Admission ticket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Active,
    Pending,
    Cancelled,
    Used,
}

impl StateMachine for TicketStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TicketStatus::*;
        matches!(
            (self, target),
            (Pending, Active)
                | (Pending, Cancelled)
                | (Active, Pending)
                | (Active, Cancelled)
                | (Active, Used)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TicketStatus::*;
        match self {
            Pending => vec![Active, Cancelled],
            Active => vec![Pending, Cancelled, Used],
            Cancelled | Used => vec![],
        }
    }
}

/// Generates `as_str`, `parse` and `Display` from a variant/name table.
/// The names are the persisted and wire representation.
macro_rules! status_names {
    ($ty:ident { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)*
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($name => Some($ty::$variant),)*
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_names!(InvoiceStatus {
    Pending => "PENDING",
    PartiallyPaid => "PARTIALLY_PAID",
    Paid => "PAID",
});

status_names!(InstallmentStatus {
    Pending => "PENDING",
    Paid => "PAID",
    Overdue => "OVERDUE",
    Cancelled => "CANCELLED",
});

status_names!(PaymentMethod {
    Pix => "PIX",
    CreditCard => "CREDIT_CARD",
    DebitCard => "DEBIT_CARD",
    BankTransfer => "BANK_TRANSFER",
    Cash => "CASH",
});

status_names!(PaymentStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Paid => "PAID",
    Failed => "FAILED",
    Refunded => "REFUNDED",
    Cancelled => "CANCELLED",
});

status_names!(TicketStatus {
    Active => "ACTIVE",
    Pending => "PENDING",
    Cancelled => "CANCELLED",
    Used => "USED",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_in_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&InvoiceStatus::PartiallyPaid).unwrap(),
            "\"PARTIALLY_PAID\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"BANK_TRANSFER\""
        );
        assert_eq!(PaymentMethod::CreditCard.to_string(), "CREDIT_CARD");
        assert_eq!(TicketStatus::Active.to_string(), "ACTIVE");
    }

    #[test]
    fn names_parse_back_and_match_serde() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
        assert_eq!(InstallmentStatus::parse("paid"), None);
        assert_eq!(PaymentMethod::parse("WIRE"), None);
    }

    // ══════════════════════════════════════════════════════════════
    // Installment transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn pending_and_overdue_installments_accept_payment() {
        assert!(InstallmentStatus::Pending.can_transition_to(&InstallmentStatus::Paid));
        assert!(InstallmentStatus::Overdue.can_transition_to(&InstallmentStatus::Paid));
        assert!(InstallmentStatus::Pending.accepts_payment());
        assert!(InstallmentStatus::Overdue.accepts_payment());
        assert!(!InstallmentStatus::Paid.accepts_payment());
    }

    #[test]
    fn paid_installment_only_rolls_back_to_pending() {
        assert_eq!(
            InstallmentStatus::Paid.valid_transitions(),
            vec![InstallmentStatus::Pending]
        );
        assert!(!InstallmentStatus::Paid.can_transition_to(&InstallmentStatus::Overdue));
    }

    #[test]
    fn cancelled_installment_is_terminal() {
        assert!(InstallmentStatus::Cancelled.is_terminal());
        assert!(InstallmentStatus::Cancelled
            .transition_to(InstallmentStatus::Paid)
            .is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Payment transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn failed_payment_can_still_be_paid() {
        assert!(PaymentStatus::Failed.can_transition_to(&PaymentStatus::Paid));
        assert!(!PaymentStatus::Failed.can_transition_to(&PaymentStatus::Cancelled));
    }

    #[test]
    fn paid_payment_is_only_reversible() {
        assert!(PaymentStatus::Paid.can_transition_to(&PaymentStatus::Cancelled));
        assert!(PaymentStatus::Paid.can_transition_to(&PaymentStatus::Refunded));
        assert!(!PaymentStatus::Paid.can_transition_to(&PaymentStatus::Failed));
        assert!(!PaymentStatus::Paid.can_transition_to(&PaymentStatus::Pending));
    }

    #[test]
    fn reversed_payments_are_terminal() {
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(PaymentStatus::Refunded.is_reversed());
        assert!(!PaymentStatus::Paid.is_reversed());
    }

    #[test]
    fn open_statuses() {
        assert!(PaymentStatus::Pending.is_open());
        assert!(PaymentStatus::Processing.is_open());
        assert!(PaymentStatus::Failed.is_open());
        assert!(!PaymentStatus::Paid.is_open());
        assert!(!PaymentStatus::Cancelled.is_open());
    }

    // ══════════════════════════════════════════════════════════════
    // Ticket transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn ticket_activation_round_trip() {
        assert!(TicketStatus::Pending.can_transition_to(&TicketStatus::Active));
        assert!(TicketStatus::Active.can_transition_to(&TicketStatus::Pending));
    }

    #[test]
    fn used_and_cancelled_tickets_are_terminal() {
        assert!(TicketStatus::Used.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
        assert!(!TicketStatus::Pending.can_transition_to(&TicketStatus::Used));
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in [
            TicketStatus::Active,
            TicketStatus::Pending,
            TicketStatus::Cancelled,
            TicketStatus::Used,
        ] {
            for target in status.valid_transitions() {
                assert!(status.can_transition_to(&target));
            }
        }
        for status in [
            InstallmentStatus::Pending,
            InstallmentStatus::Paid,
            InstallmentStatus::Overdue,
            InstallmentStatus::Cancelled,
        ] {
            for target in status.valid_transitions() {
                assert!(status.can_transition_to(&target));
            }
        }
    }
}
