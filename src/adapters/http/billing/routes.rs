//! Route configuration for billing endpoints.
//!
//! Configures Axum router with billing-related routes.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    cancel_payment, generate_invoice, get_invoice, handle_stripe_webhook, record_payment,
    start_checkout, BillingAppState,
};

/// Creates the billing router with all endpoints.
///
/// Routes:
/// - `POST /api/invoices` - Generate an invoice with installments and tickets
/// - `GET /api/invoices/:id` - Fetch an invoice graph
/// - `POST /api/payments` - Register a manual payment
/// - `POST /api/payments/:id/cancel` - Cancel a settled payment
/// - `POST /api/installments/:id/checkout` - Start a gateway payment
/// - `POST /api/webhooks/stripe` - Gateway webhooks (signature verified, no staff header)
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .route("/api/invoices", post(generate_invoice))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/payments", post(record_payment))
        .route("/api/payments/:id/cancel", post(cancel_payment))
        .route("/api/installments/:id/checkout", post(start_checkout))
        .route("/api/webhooks/stripe", post(handle_stripe_webhook))
}
