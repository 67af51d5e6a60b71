//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresBillingStore` - Transactional billing persistence with row locks

mod billing_rows;
mod billing_store;

pub use billing_store::{PostgresBillingStore, PostgresBillingTransaction};
