//! Billing domain module.
//!
//! Invoices, installments, payments and tickets, plus the pure rules that
//! govern them.
//!
//! # Module Structure
//!
//! - `status` - status enums and transition tables
//! - `invoice`, `installment`, `payment`, `ticket` - entities
//! - `schedule` - request validation, installment and ticket price split
//! - `numbering` - invoice/payment/ticket number formats
//! - `aggregation` - invoice status from the installment snapshot
//! - `errors` - `BillingError` taxonomy

mod aggregation;
mod errors;
mod installment;
mod invoice;
mod numbering;
mod payment;
mod registration;
mod schedule;
mod status;
mod ticket;

pub use aggregation::{aggregate, Aggregate, TicketAction};
pub use errors::BillingError;
pub use installment::Installment;
pub use invoice::{InstallmentWithPayments, Invoice, InvoiceGraph};
pub use numbering::{
    event_slug, event_tag, invoice_number, new_scan_code, payment_number, ticket_number,
    NumberScope,
};
pub use payment::{NewPayment, Payment};
pub use registration::{EventInfo, Registration, RegistrationStatus};
pub use schedule::{
    installment_schedule, ticket_prices, InvoiceRequest, MAX_INSTALLMENTS, MAX_TICKETS,
};
pub use status::{InstallmentStatus, InvoiceStatus, PaymentMethod, PaymentStatus, TicketStatus};
pub use ticket::Ticket;
