//! Collaborator records the engine reads or upserts but does not own.

use crate::domain::foundation::{EventId, PersonId, RegistrationId, Timestamp};
use serde::{Deserialize, Serialize};

/// The slice of an event the billing engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: EventId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "PENDING",
            RegistrationStatus::Confirmed => "CONFIRMED",
            RegistrationStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A person's registration for an event, upserted when an invoice is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub person_id: PersonId,
    pub event_id: EventId,
    pub status: RegistrationStatus,
    pub updated_at: Timestamp,
}
