//! Billing handlers.
//!
//! Command and query handlers for the invoice lifecycle:
//!
//! ## Commands
//! - Generating invoices with their installments and tickets
//! - Recording installment payments (ledger)
//! - Cancelling payments
//! - Starting gateway payments
//! - Reconciling gateway webhooks
//! - Recomputing invoice status
//!
//! ## Queries
//! - Get invoice graph
//!
//! Every command runs in exactly one store transaction, except gateway
//! checkout, which keeps the network call outside of it.

mod cancel_payment;
mod generate_invoice;
mod get_invoice;
mod handle_gateway_webhook;
mod numbering;
mod recompute_invoice_status;
mod record_payment;
mod start_gateway_payment;
mod transaction;

#[cfg(test)]
pub(crate) mod test_support;

pub use numbering::NumberingPolicy;

// Commands
pub use cancel_payment::{
    CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult, ReversalOutcome,
};
pub use generate_invoice::{GenerateInvoiceCommand, GenerateInvoiceHandler};
pub use handle_gateway_webhook::{
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
};
pub use recompute_invoice_status::{
    RecomputeInvoiceStatusCommand, RecomputeInvoiceStatusHandler, RecomputeInvoiceStatusResult,
};
pub use record_payment::{
    RecordPaymentCommand, RecordPaymentHandler, RecordPaymentResult, SettlementOutcome,
};
pub use start_gateway_payment::{
    StartGatewayPaymentCommand, StartGatewayPaymentHandler, StartGatewayPaymentResult,
};

// Queries
pub use get_invoice::{GetInvoiceHandler, GetInvoiceQuery};
