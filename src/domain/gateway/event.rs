//! Gateway event envelope and the typed objects the reconciler acts on.
//!
//! The wire format is Stripe's. Only fields relevant to reconciliation are
//! captured; everything else in the payload is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::WebhookError;

/// Event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEvent {
    /// Unique identifier for the event (`evt_xxx`).
    pub id: String,

    /// Event type (e.g. `payment_intent.succeeded`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp of event creation.
    pub created: i64,

    pub data: GatewayEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEventData {
    /// The object that triggered the event (shape depends on the type).
    pub object: serde_json::Value,
}

/// Event types the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventType {
    PaymentSucceeded,
    PaymentFailed,
    ChargeRefunded,
    Unknown,
}

impl GatewayEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "payment_intent.succeeded" => Self::PaymentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentFailed,
            "charge.refunded" => Self::ChargeRefunded,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentSucceeded => "payment_intent.succeeded",
            Self::PaymentFailed => "payment_intent.payment_failed",
            Self::ChargeRefunded => "charge.refunded",
            Self::Unknown => "unknown",
        }
    }
}

/// Payment intent object (succeeded / failed events).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentIntentObject {
    pub id: String,

    /// Amount in the smallest currency unit.
    #[serde(default)]
    pub amount: Option<i64>,

    /// Charge created by the last confirmation attempt.
    #[serde(default)]
    pub latest_charge: Option<String>,

    #[serde(default)]
    pub last_payment_error: Option<PaymentErrorObject>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentErrorObject {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PaymentIntentObject {
    /// Human-readable failure reason, if the gateway supplied one.
    pub fn failure_reason(&self) -> Option<String> {
        let error = self.last_payment_error.as_ref()?;
        error.message.clone().or_else(|| error.code.clone())
    }
}

/// Charge object (refund events).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChargeObject {
    pub id: String,

    #[serde(default)]
    pub payment_intent: Option<String>,

    /// True only when the charge is fully refunded.
    #[serde(default)]
    pub refunded: bool,

    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub amount_refunded: i64,
}

/// A decoded event, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentSucceeded(PaymentIntentObject),
    PaymentFailed(PaymentIntentObject),
    ChargeRefunded(ChargeObject),
    Unknown(String),
}

impl GatewayEvent {
    pub fn parsed_type(&self) -> GatewayEventType {
        GatewayEventType::parse(&self.event_type)
    }

    /// Decodes the data object according to the event type.
    pub fn kind(&self) -> Result<GatewayEventKind, WebhookError> {
        Ok(match self.parsed_type() {
            GatewayEventType::PaymentSucceeded => {
                GatewayEventKind::PaymentSucceeded(self.object()?)
            }
            GatewayEventType::PaymentFailed => GatewayEventKind::PaymentFailed(self.object()?),
            GatewayEventType::ChargeRefunded => GatewayEventKind::ChargeRefunded(self.object()?),
            GatewayEventType::Unknown => GatewayEventKind::Unknown(self.event_type.clone()),
        })
    }

    fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| WebhookError::ParseError(format!("{} object: {}", self.event_type, e)))
    }
}
