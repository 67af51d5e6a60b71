//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum REST API
//! - `postgres` - Transactional billing persistence
//! - `memory` - In-process store for tests and local runs
//! - `stripe` - Payment gateway client

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use memory::InMemoryBillingStore;
pub use postgres::PostgresBillingStore;
pub use stripe::{MockPaymentGateway, StripePaymentGateway};
