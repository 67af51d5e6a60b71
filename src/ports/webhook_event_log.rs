//! Records of processed gateway webhook events.
//!
//! The gateway delivers at least once. State guards in the reconciler make
//! redelivery harmless; these records are the audit trail and let a
//! completed delivery short-circuit before touching any rows.

use chrono::{DateTime, Utc};

/// Outcome of processing one gateway event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State was reconciled.
    Success,
    /// Acknowledged without state change (unknown type, unmatched reference).
    Ignored,
    /// Processing failed and was rolled back. A redelivery may retry.
    Failed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Success => "success",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(WebhookOutcome::Success),
            "ignored" => Some(WebhookOutcome::Ignored),
            "failed" => Some(WebhookOutcome::Failed),
            _ => None,
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventRecord {
    /// Gateway event ID (`evt_xxx`).
    pub event_id: String,

    /// Gateway event type (e.g. `charge.refunded`).
    pub event_type: String,

    pub processed_at: DateTime<Utc>,
    pub outcome: WebhookOutcome,

    /// Failure message, or the reason an event was ignored.
    pub message: Option<String>,

    /// Original event payload for debugging.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(event_id, event_type, WebhookOutcome::Success, None, payload)
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            event_id,
            event_type,
            WebhookOutcome::Ignored,
            Some(reason.into()),
            payload,
        )
    }

    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            event_id,
            event_type,
            WebhookOutcome::Failed,
            Some(error.into()),
            payload,
        )
    }

    fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        outcome: WebhookOutcome,
        message: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            outcome,
            message,
            payload,
        }
    }

    /// A completed record means redelivery has nothing left to do.
    pub fn is_final(&self) -> bool {
        self.outcome != WebhookOutcome::Failed
    }
}

/// Result of attempting to save a webhook event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was written (first delivery, or a retry of a failed one).
    Inserted,
    /// A final record already exists for this event.
    AlreadyExists,
}
