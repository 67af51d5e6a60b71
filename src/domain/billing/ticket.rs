//! Admission ticket entity.

use crate::domain::foundation::{EventId, InvoiceId, Money, PersonId, TicketId, Timestamp};
use serde::{Deserialize, Serialize};

use super::TicketStatus;

/// # Invariants
///
/// - tickets of a PAID invoice are ACTIVE unless individually cancelled or used
/// - tickets of a non-PAID invoice are never ACTIVE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub invoice_id: InvoiceId,
    pub event_id: EventId,
    pub person_id: PersonId,

    /// Unique, derived from the event name and id, the year and a running counter.
    pub number: String,

    /// Unique opaque code printed on the credential.
    pub scan_code: String,

    pub ticket_type: String,
    pub price: Money,
    pub status: TicketStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Ticket {
    /// PENDING -> ACTIVE. Any other status is left alone.
    pub fn activate(&mut self, now: Timestamp) -> bool {
        self.set_if(TicketStatus::Pending, TicketStatus::Active, now)
    }

    /// ACTIVE -> PENDING. Cancelled and used tickets are left alone.
    pub fn deactivate(&mut self, now: Timestamp) -> bool {
        self.set_if(TicketStatus::Active, TicketStatus::Pending, now)
    }

    fn set_if(&mut self, from: TicketStatus, to: TicketStatus, now: Timestamp) -> bool {
        if self.status != from {
            return false;
        }
        self.status = to;
        self.updated_at = now;
        true
    }
}
