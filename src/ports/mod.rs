//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence
//!
//! - `BillingStore` - Opens transactions and serves invoice queries
//! - `BillingTransaction` - One atomic unit of billing work with row locks
//!
//! ## Payment Gateway
//!
//! - `PaymentGateway` - Lazy payment intent creation
//! - `WebhookEventRecord` - Audit record of processed gateway events

mod billing_store;
mod payment_gateway;
mod webhook_event_log;

pub use billing_store::{BillingStore, BillingTransaction};
pub use payment_gateway::{
    CreatePaymentIntentRequest, PaymentError, PaymentErrorCode, PaymentGateway, PaymentIntent,
};
pub use webhook_event_log::{SaveResult, WebhookEventRecord, WebhookOutcome};
