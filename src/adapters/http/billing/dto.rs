//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer. Amounts
//! travel as decimal strings (`"180.00"`) so no precision is lost in transit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    Installment, InstallmentStatus, InstallmentWithPayments, InvoiceGraph, InvoiceStatus, Payment,
    PaymentMethod, PaymentStatus, Ticket, TicketStatus,
};
use crate::domain::foundation::{EventId, InstallmentId, PersonId, Timestamp};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to generate an invoice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInvoiceRequest {
    pub person_id: PersonId,
    pub event_id: EventId,
    /// Total amount, at most two decimal places.
    pub amount: Decimal,
    /// Number of monthly installments.
    pub installments: u32,
    pub ticket_quantity: u32,
    pub ticket_type: String,
}

/// Request to register a manual payment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    pub installment_id: InstallmentId,
    pub method: PaymentMethod,
    pub amount: Decimal,
    /// Bank or gateway transaction id. Replays with the same id are no-ops.
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Request to start a gateway checkout for an installment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCheckoutRequest {
    pub method: PaymentMethod,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Invoice with its installments, payments and tickets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: String,
    pub number: String,
    pub person_id: String,
    pub event_id: String,
    pub total_amount: Decimal,
    pub status: InvoiceStatus,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub installments: Vec<InstallmentResponse>,
    pub tickets: Vec<TicketResponse>,
}

impl From<InvoiceGraph> for InvoiceResponse {
    fn from(graph: InvoiceGraph) -> Self {
        let invoice = graph.invoice;
        Self {
            id: invoice.id.to_string(),
            number: invoice.number,
            person_id: invoice.person_id.to_string(),
            event_id: invoice.event_id.to_string(),
            total_amount: invoice.total_amount.as_decimal(),
            status: invoice.status,
            created_by: invoice.created_by.to_string(),
            created_at: rfc3339(&invoice.created_at),
            updated_at: rfc3339(&invoice.updated_at),
            installments: graph
                .installments
                .into_iter()
                .map(InstallmentResponse::from)
                .collect(),
            tickets: graph.tickets.into_iter().map(TicketResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentResponse {
    pub id: String,
    pub invoice_id: String,
    pub number: u32,
    pub amount: Decimal,
    pub due_at: String,
    pub status: InstallmentStatus,
    pub paid_at: Option<String>,
    /// Present when the installment is part of an invoice graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payments: Option<Vec<PaymentResponse>>,
}

impl From<Installment> for InstallmentResponse {
    fn from(installment: Installment) -> Self {
        Self {
            id: installment.id.to_string(),
            invoice_id: installment.invoice_id.to_string(),
            number: installment.number,
            amount: installment.amount.as_decimal(),
            due_at: rfc3339(&installment.due_at),
            status: installment.status,
            paid_at: installment.paid_at.as_ref().map(rfc3339),
            payments: None,
        }
    }
}

impl From<InstallmentWithPayments> for InstallmentResponse {
    fn from(entry: InstallmentWithPayments) -> Self {
        let payments = entry.payments.into_iter().map(PaymentResponse::from).collect();
        Self {
            payments: Some(payments),
            ..Self::from(entry.installment)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub number: String,
    pub installment_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub external_payment_ref: Option<String>,
    pub external_charge_ref: Option<String>,
    pub note: Option<String>,
    pub paid_at: Option<String>,
    pub created_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            number: payment.number,
            installment_id: payment.installment_id.to_string(),
            amount: payment.amount.as_decimal(),
            method: payment.method,
            status: payment.status,
            external_payment_ref: payment.external_payment_ref,
            external_charge_ref: payment.external_charge_ref,
            note: payment.note,
            paid_at: payment.paid_at.as_ref().map(rfc3339),
            created_at: rfc3339(&payment.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub id: String,
    pub number: String,
    pub scan_code: String,
    pub ticket_type: String,
    pub price: Decimal,
    pub status: TicketStatus,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id.to_string(),
            number: ticket.number,
            scan_code: ticket.scan_code,
            ticket_type: ticket.ticket_type,
            price: ticket.price.as_decimal(),
            status: ticket.status,
        }
    }
}

/// Payment together with the installment it settled or reopened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChangeResponse {
    pub payment: PaymentResponse,
    pub installment: InstallmentResponse,
    pub invoice_status: InvoiceStatus,
}

/// Response for a started gateway checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub payment: PaymentResponse,
    pub client_secret: Option<String>,
}

/// Webhook acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

fn rfc3339(ts: &Timestamp) -> String {
    ts.as_datetime().to_rfc3339()
}
