//! Database row types for the billing tables and their domain conversions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::billing::{
    Installment, InstallmentStatus, Invoice, InvoiceStatus, Payment, PaymentMethod,
    PaymentStatus, Ticket, TicketStatus,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, EventId, InstallmentId, InvoiceId, Money, PaymentId, PersonId,
    TicketId, Timestamp, UserId,
};
use crate::ports::{WebhookEventRecord, WebhookOutcome};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct InvoiceRow {
    id: Uuid,
    number: String,
    person_id: Uuid,
    event_id: Uuid,
    total_amount: Decimal,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            number: row.number,
            person_id: PersonId::from_uuid(row.person_id),
            event_id: EventId::from_uuid(row.event_id),
            total_amount: money(row.total_amount, "total_amount")?,
            status: parse_column(InvoiceStatus::parse(&row.status), "invoice status", &row.status)?,
            created_by: UserId::new(row.created_by)
                .map_err(|e| corrupt(format!("Invalid created_by: {}", e)))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct InstallmentRow {
    id: Uuid,
    invoice_id: Uuid,
    number: i32,
    amount: Decimal,
    due_at: DateTime<Utc>,
    status: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InstallmentRow> for Installment {
    type Error = DomainError;

    fn try_from(row: InstallmentRow) -> Result<Self, Self::Error> {
        Ok(Installment {
            id: InstallmentId::from_uuid(row.id),
            invoice_id: InvoiceId::from_uuid(row.invoice_id),
            number: u32::try_from(row.number)
                .map_err(|_| corrupt(format!("Invalid installment number: {}", row.number)))?,
            amount: money(row.amount, "amount")?,
            due_at: Timestamp::from_datetime(row.due_at),
            status: parse_column(
                InstallmentStatus::parse(&row.status),
                "installment status",
                &row.status,
            )?,
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PaymentRow {
    id: Uuid,
    number: String,
    installment_id: Uuid,
    amount: Decimal,
    method: String,
    status: String,
    external_payment_ref: Option<String>,
    external_charge_ref: Option<String>,
    note: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            number: row.number,
            installment_id: InstallmentId::from_uuid(row.installment_id),
            amount: money(row.amount, "amount")?,
            method: parse_column(PaymentMethod::parse(&row.method), "payment method", &row.method)?,
            status: parse_column(PaymentStatus::parse(&row.status), "payment status", &row.status)?,
            external_payment_ref: row.external_payment_ref,
            external_charge_ref: row.external_charge_ref,
            note: row.note,
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TicketRow {
    id: Uuid,
    invoice_id: Uuid,
    event_id: Uuid,
    person_id: Uuid,
    number: String,
    scan_code: String,
    ticket_type: String,
    price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = DomainError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: TicketId::from_uuid(row.id),
            invoice_id: InvoiceId::from_uuid(row.invoice_id),
            event_id: EventId::from_uuid(row.event_id),
            person_id: PersonId::from_uuid(row.person_id),
            number: row.number,
            scan_code: row.scan_code,
            ticket_type: row.ticket_type,
            price: money(row.price, "price")?,
            status: parse_column(TicketStatus::parse(&row.status), "ticket status", &row.status)?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct WebhookEventRow {
    event_id: String,
    event_type: String,
    result: String,
    error_message: Option<String>,
    payload: serde_json::Value,
    processed_at: DateTime<Utc>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            processed_at: row.processed_at,
            outcome: parse_column(WebhookOutcome::parse(&row.result), "webhook result", &row.result)?,
            message: row.error_message,
            payload: row.payload,
        })
    }
}

pub(super) const INVOICE_COLUMNS: &str =
    "id, number, person_id, event_id, total_amount, status, created_by, created_at, updated_at";

pub(super) const INSTALLMENT_COLUMNS: &str =
    "id, invoice_id, number, amount, due_at, status, paid_at, created_at, updated_at";

pub(super) const PAYMENT_COLUMNS: &str = "id, number, installment_id, amount, method, status, \
     external_payment_ref, external_charge_ref, note, paid_at, created_at, updated_at";

pub(super) const TICKET_COLUMNS: &str = "id, invoice_id, event_id, person_id, number, scan_code, \
     ticket_type, price, status, created_at, updated_at";

fn money(value: Decimal, column: &str) -> Result<Money, DomainError> {
    Money::new(value).map_err(|e| corrupt(format!("Invalid {} value: {}", column, e)))
}

fn parse_column<T>(parsed: Option<T>, what: &str, raw: &str) -> Result<T, DomainError> {
    parsed.ok_or_else(|| corrupt(format!("Invalid {} value: {}", what, raw)))
}

fn corrupt(message: String) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn payment_row(status: &str) -> PaymentRow {
        let now = Utc::now();
        PaymentRow {
            id: Uuid::new_v4(),
            number: "PAY-2026-000001".to_string(),
            installment_id: Uuid::new_v4(),
            amount: dec(18_000),
            method: "PIX".to_string(),
            status: status.to_string(),
            external_payment_ref: Some("pi_abc".to_string()),
            external_charge_ref: None,
            note: None,
            paid_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn payment_row_converts() {
        let payment = Payment::try_from(payment_row("PAID")).unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.method, PaymentMethod::Pix);
        assert_eq!(payment.amount, Money::from_cents(18_000).unwrap());
        assert!(payment.has_payment_ref("pi_abc"));
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let err = Payment::try_from(payment_row("SETTLED")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.contains("SETTLED"));
    }

    #[test]
    fn negative_installment_number_is_rejected() {
        let now = Utc::now();
        let row = InstallmentRow {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            number: -1,
            amount: dec(2_500),
            due_at: now,
            status: "PENDING".to_string(),
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(Installment::try_from(row).is_err());
    }
}
