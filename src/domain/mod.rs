//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `billing` - Invoices, installments, payments, tickets and their rules
//! - `gateway` - Payment gateway webhook verification and event decoding

pub mod billing;
pub mod foundation;
pub mod gateway;
