//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port:
//! - `StripePaymentGateway` - PaymentIntent creation over the REST API
//! - `MockPaymentGateway` - In-process double for tests and local runs
//!
//! Webhook signature verification lives in `domain::gateway`, since it is
//! pure and needs no network access.
//!
//! # Security
//!
//! - The API key is held in `secrecy::Secret` and only exposed for basic auth
//! - Every intent carries an `Idempotency-Key` so client retries never
//!   create a second intent

mod mock_gateway;
mod stripe_gateway;

pub use mock_gateway::MockPaymentGateway;
pub use stripe_gateway::{StripeConfig, StripePaymentGateway};
