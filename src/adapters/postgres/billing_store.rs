//! PostgreSQL implementation of BillingStore.
//!
//! Each `BillingTransaction` wraps one sqlx transaction. Every transaction
//! starts with a local `statement_timeout` so a stuck lock surfaces as an
//! error the caller can retry instead of blocking forever.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::Postgres;
use sqlx::{PgPool, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    EventInfo, Installment, InstallmentStatus, InstallmentWithPayments, Invoice, InvoiceGraph,
    NumberScope, Payment, Registration, RegistrationStatus, Ticket, TicketStatus,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, EventId, InstallmentId, InvoiceId, PaymentId, PersonId,
    RegistrationId, Timestamp,
};
use crate::ports::{BillingStore, BillingTransaction, SaveResult, WebhookEventRecord};

use super::billing_rows::{
    InstallmentRow, InvoiceRow, PaymentRow, TicketRow, WebhookEventRow, INSTALLMENT_COLUMNS,
    INVOICE_COLUMNS, PAYMENT_COLUMNS, TICKET_COLUMNS,
};

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL implementation of the BillingStore port.
pub struct PostgresBillingStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database("Migration failed", e))
    }

    async fn open(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;
        self.set_statement_timeout(&mut tx).await?;
        Ok(tx)
    }

    async fn set_statement_timeout(
        &self,
        tx: &mut Transaction<'static, Postgres>,
    ) -> Result<(), DomainError> {
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{}ms", self.statement_timeout.as_millis()))
            .execute(&mut **tx)
            .await
            .map_err(|e| DomainError::database("Failed to set statement timeout", e))?;
        Ok(())
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let tx = self.open().await?;
        Ok(Box::new(PostgresBillingTransaction { tx }))
    }

    async fn load_invoice_graph(
        &self,
        id: InvoiceId,
    ) -> Result<Option<InvoiceGraph>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        // One snapshot for all four reads. Must precede any other statement.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to set isolation level", e))?;
        self.set_statement_timeout(&mut tx).await?;

        let sql = format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLUMNS);
        let row: Option<InvoiceRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to load invoice", e))?;

        let invoice = match row {
            Some(row) => Invoice::try_from(row)?,
            None => return Ok(None),
        };

        let sql = format!(
            "SELECT {} FROM installments WHERE invoice_id = $1 ORDER BY number",
            INSTALLMENT_COLUMNS
        );
        let installments: Vec<Installment> = sqlx::query_as::<_, InstallmentRow>(&sql)
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to load installments", e))?
            .into_iter()
            .map(Installment::try_from)
            .collect::<Result<_, _>>()?;

        let sql = format!(
            "SELECT {} FROM payments \
             WHERE installment_id IN (SELECT id FROM installments WHERE invoice_id = $1) \
             ORDER BY created_at, id",
            PAYMENT_COLUMNS
        );
        let payments: Vec<Payment> = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to load payments", e))?
            .into_iter()
            .map(Payment::try_from)
            .collect::<Result<_, _>>()?;

        let sql = format!(
            "SELECT {} FROM tickets WHERE invoice_id = $1 ORDER BY number",
            TICKET_COLUMNS
        );
        let tickets: Vec<Ticket> = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to load tickets", e))?
            .into_iter()
            .map(Ticket::try_from)
            .collect::<Result<_, _>>()?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to close read transaction", e))?;

        let installments = installments
            .into_iter()
            .map(|installment| {
                let payments = payments
                    .iter()
                    .filter(|p| p.installment_id == installment.id)
                    .cloned()
                    .collect();
                InstallmentWithPayments {
                    installment,
                    payments,
                }
            })
            .collect();

        Ok(Some(InvoiceGraph {
            invoice,
            installments,
            tickets,
        }))
    }

    async fn mark_overdue_installments(&self, now: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE installments SET status = $1, updated_at = $2
            WHERE status = $3 AND due_at < $2
            "#,
        )
        .bind(InstallmentStatus::Overdue.as_str())
        .bind(now.as_datetime())
        .bind(InstallmentStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to mark overdue installments", e))?;

        Ok(result.rows_affected())
    }
}

/// A live PostgreSQL transaction. Dropping it rolls back.
pub struct PostgresBillingTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresBillingTransaction {
    async fn fetch_payments(
        &mut self,
        filter: &str,
        value: &str,
        context: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE {} = $1 ORDER BY created_at, id",
            PAYMENT_COLUMNS, filter
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(value)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database(context, e))?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }

    async fn set_ticket_status(
        &mut self,
        invoice_id: InvoiceId,
        from: TicketStatus,
        to: TicketStatus,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets SET status = $3, updated_at = $4
            WHERE invoice_id = $1 AND status = $2
            "#,
        )
        .bind(invoice_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to update tickets", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BillingTransaction for PostgresBillingTransaction {
    async fn person_exists(&mut self, id: PersonId) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM people WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to look up person", e))
    }

    async fn find_event(&mut self, id: EventId) -> Result<Option<EventInfo>, DomainError> {
        let row: Option<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM events WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to look up event", e))?;

        Ok(row.map(|(id, name)| EventInfo {
            id: EventId::from_uuid(id),
            name,
        }))
    }

    async fn upsert_registration(
        &mut self,
        person_id: PersonId,
        event_id: EventId,
        status: RegistrationStatus,
        now: Timestamp,
    ) -> Result<Registration, DomainError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO registrations (id, person_id, event_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (person_id, event_id)
            DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(person_id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(status.as_str())
        .bind(now.as_datetime())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to upsert registration", e))?;

        Ok(Registration {
            id: RegistrationId::from_uuid(id),
            person_id,
            event_id,
            status,
            updated_at: now,
        })
    }

    async fn next_sequence(&mut self, scope: NumberScope) -> Result<i64, DomainError> {
        // The upsert row-locks the counter until commit, serializing
        // concurrent generators of the same scope.
        sqlx::query_scalar(
            r#"
            INSERT INTO number_sequences (scope, last_value) VALUES ($1, 1)
            ON CONFLICT (scope)
            DO UPDATE SET last_value = number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(scope.key())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to allocate number", e))
    }

    async fn number_taken(
        &mut self,
        scope: NumberScope,
        number: &str,
    ) -> Result<bool, DomainError> {
        let sql = match scope {
            NumberScope::Invoice { .. } => "SELECT EXISTS (SELECT 1 FROM invoices WHERE number = $1)",
            NumberScope::Payment { .. } => "SELECT EXISTS (SELECT 1 FROM payments WHERE number = $1)",
            NumberScope::Ticket { .. } => "SELECT EXISTS (SELECT 1 FROM tickets WHERE number = $1)",
        };
        sqlx::query_scalar(sql)
            .bind(number)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to check number", e))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, number, person_id, event_id, total_amount, status,
                created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(&invoice.number)
        .bind(invoice.person_id.as_uuid())
        .bind(invoice.event_id.as_uuid())
        .bind(invoice.total_amount.as_decimal())
        .bind(invoice.status.as_str())
        .bind(invoice.created_by.as_str())
        .bind(invoice.created_at.as_datetime())
        .bind(invoice.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to insert invoice", e))?;

        Ok(())
    }

    async fn insert_installments(
        &mut self,
        installments: &[Installment],
    ) -> Result<(), DomainError> {
        for installment in installments {
            sqlx::query(
                r#"
                INSERT INTO installments (
                    id, invoice_id, number, amount, due_at, status,
                    paid_at, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(installment.id.as_uuid())
            .bind(installment.invoice_id.as_uuid())
            .bind(sql_int(installment.number)?)
            .bind(installment.amount.as_decimal())
            .bind(installment.due_at.as_datetime())
            .bind(installment.status.as_str())
            .bind(installment.paid_at.as_ref().map(Timestamp::as_datetime))
            .bind(installment.created_at.as_datetime())
            .bind(installment.updated_at.as_datetime())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error("Failed to insert installment", e))?;
        }
        Ok(())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), DomainError> {
        for ticket in tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (
                    id, invoice_id, event_id, person_id, number, scan_code,
                    ticket_type, price, status, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.invoice_id.as_uuid())
            .bind(ticket.event_id.as_uuid())
            .bind(ticket.person_id.as_uuid())
            .bind(&ticket.number)
            .bind(&ticket.scan_code)
            .bind(&ticket.ticket_type)
            .bind(ticket.price.as_decimal())
            .bind(ticket.status.as_str())
            .bind(ticket.created_at.as_datetime())
            .bind(ticket.updated_at.as_datetime())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error("Failed to insert ticket", e))?;
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, number, installment_id, amount, method, status,
                external_payment_ref, external_charge_ref, note,
                paid_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(&payment.number)
        .bind(payment.installment_id.as_uuid())
        .bind(payment.amount.as_decimal())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.external_payment_ref)
        .bind(&payment.external_charge_ref)
        .bind(&payment.note)
        .bind(payment.paid_at.as_ref().map(Timestamp::as_datetime))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to insert payment", e))?;

        Ok(())
    }

    async fn find_invoice_id_for_installment(
        &mut self,
        id: InstallmentId,
    ) -> Result<Option<InvoiceId>, DomainError> {
        let invoice_id: Option<Uuid> =
            sqlx::query_scalar("SELECT invoice_id FROM installments WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| DomainError::database("Failed to find installment", e))?;

        Ok(invoice_id.map(InvoiceId::from_uuid))
    }

    async fn find_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payments_by_payment_ref(
        &mut self,
        reference: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        self.fetch_payments(
            "external_payment_ref",
            reference,
            "Failed to find payments by payment reference",
        )
        .await
    }

    async fn find_payments_by_charge_ref(
        &mut self,
        reference: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        self.fetch_payments(
            "external_charge_ref",
            reference,
            "Failed to find payments by charge reference",
        )
        .await
    }

    async fn list_installments(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Installment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM installments WHERE invoice_id = $1 ORDER BY number",
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, InstallmentRow>(&sql)
            .bind(invoice_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to list installments", e))?
            .into_iter()
            .map(Installment::try_from)
            .collect()
    }

    async fn list_payments(
        &mut self,
        installment_id: InstallmentId,
    ) -> Result<Vec<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE installment_id = $1 ORDER BY created_at, id",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(installment_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to list payments", e))?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, DomainError> {
        let sql = format!("SELECT {} FROM invoices WHERE id = $1 FOR UPDATE", INVOICE_COLUMNS);
        let row: Option<InvoiceRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock invoice", e))?;

        row.map(Invoice::try_from).transpose()
    }

    async fn lock_installment(
        &mut self,
        id: InstallmentId,
    ) -> Result<Option<Installment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM installments WHERE id = $1 FOR UPDATE",
            INSTALLMENT_COLUMNS
        );
        let row: Option<InstallmentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock installment", e))?;

        row.map(Installment::try_from).transpose()
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1 FOR UPDATE", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn update_invoice_status(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE invoices SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(invoice.id.as_uuid())
            .bind(invoice.status.as_str())
            .bind(invoice.updated_at.as_datetime())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to update invoice", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::InvoiceNotFound, "Invoice not found")
                .with_detail("id", invoice.id.to_string()));
        }
        Ok(())
    }

    async fn update_installment(&mut self, installment: &Installment) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE installments SET status = $2, paid_at = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(installment.id.as_uuid())
        .bind(installment.status.as_str())
        .bind(installment.paid_at.as_ref().map(Timestamp::as_datetime))
        .bind(installment.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to update installment", e))?;

        if result.rows_affected() == 0 {
            return Err(
                DomainError::new(ErrorCode::InstallmentNotFound, "Installment not found")
                    .with_detail("id", installment.id.to_string()),
            );
        }
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                external_charge_ref = $3,
                note = $4,
                paid_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.external_charge_ref)
        .bind(&payment.note)
        .bind(payment.paid_at.as_ref().map(Timestamp::as_datetime))
        .bind(payment.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to update payment", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::PaymentNotFound, "Payment not found")
                .with_detail("id", payment.id.to_string()));
        }
        Ok(())
    }

    async fn activate_tickets(
        &mut self,
        invoice_id: InvoiceId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        self.set_ticket_status(invoice_id, TicketStatus::Pending, TicketStatus::Active, now)
            .await
    }

    async fn deactivate_tickets(
        &mut self,
        invoice_id: InvoiceId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        self.set_ticket_status(invoice_id, TicketStatus::Active, TicketStatus::Pending, now)
            .await
    }

    async fn find_webhook_event(
        &mut self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, result, error_message, payload, processed_at
            FROM gateway_webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to find webhook event", e))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn save_webhook_event(
        &mut self,
        record: &WebhookEventRecord,
    ) -> Result<SaveResult, DomainError> {
        // A concurrent insert of the same id blocks here until the other
        // transaction finishes, then the WHERE sees its committed result.
        let written: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO gateway_webhook_events
                (event_id, event_type, result, error_message, payload, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                payload = EXCLUDED.payload,
                processed_at = EXCLUDED.processed_at
            WHERE gateway_webhook_events.result = 'failed'
            RETURNING event_id
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(record.outcome.as_str())
        .bind(&record.message)
        .bind(&record.payload)
        .bind(record.processed_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to save webhook event", e))?;

        Ok(match written {
            Some(_) => SaveResult::Inserted,
            None => SaveResult::AlreadyExists,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(|e| write_error("Failed to commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DomainError::database("Failed to roll back", e))
    }
}

/// Maps unique violations to `Conflict` so callers can retry; everything
/// else is a plain database error.
fn write_error(context: &str, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let constraint = db_err.constraint().unwrap_or("unique key").to_string();
            return DomainError::new(
                ErrorCode::Conflict,
                format!("{}: duplicate value for {}", context, constraint),
            )
            .with_detail("constraint", constraint);
        }
    }
    DomainError::database(context, err)
}

fn sql_int(value: u32) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|_| {
        DomainError::new(ErrorCode::ValidationFailed, format!("Value {} out of range", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_int_rejects_overflow() {
        assert_eq!(sql_int(48).unwrap(), 48);
        assert!(sql_int(u32::MAX).is_err());
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        let err = write_error("Failed to insert invoice", sqlx::Error::RowNotFound);
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.starts_with("Failed to insert invoice"));
    }
}
