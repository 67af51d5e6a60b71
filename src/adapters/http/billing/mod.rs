//! HTTP adapter for billing endpoints.
//!
//! Exposes the billing domain via REST API:
//! - `POST /api/invoices` - Generate an invoice
//! - `GET /api/invoices/:id` - Invoice with installments, payments and tickets
//! - `POST /api/payments` - Register a manual payment
//! - `POST /api/payments/:id/cancel` - Cancel a settled payment
//! - `POST /api/installments/:id/checkout` - Start a gateway payment
//! - `POST /api/webhooks/stripe` - Handle gateway webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::billing_router;
