//! Payment gateway domain: webhook authenticity and event decoding.

mod errors;
mod event;
mod verifier;

pub use errors::WebhookError;
pub use event::{
    ChargeObject, GatewayEvent, GatewayEventData, GatewayEventKind, GatewayEventType,
    PaymentErrorObject, PaymentIntentObject,
};
pub use verifier::{sign_payload, SignatureHeader, WebhookVerifier};
