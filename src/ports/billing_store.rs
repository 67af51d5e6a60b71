//! Transactional persistence port for the billing engine.
//!
//! Every mutating operation runs inside one [`BillingTransaction`]. Dropping
//! a transaction without calling [`BillingTransaction::commit`] rolls it back.
//!
//! # Locking
//!
//! `lock_*` methods take row locks held until commit. To avoid deadlocks,
//! callers lock in a fixed order: invoice, then installment, then payment.
//! `find_*` methods are plain reads used to discover what to lock.

use async_trait::async_trait;

use crate::domain::billing::{
    EventInfo, Installment, Invoice, InvoiceGraph, NumberScope, Payment, Registration,
    RegistrationStatus, Ticket,
};
use crate::domain::foundation::{
    DomainError, EventId, InstallmentId, InvoiceId, PaymentId, PersonId, Timestamp,
};

use super::webhook_event_log::{SaveResult, WebhookEventRecord};

/// Entry point: opens transactions and serves read-only queries.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError>;

    /// Loads an invoice with installments, payments and tickets.
    async fn load_invoice_graph(&self, id: InvoiceId)
        -> Result<Option<InvoiceGraph>, DomainError>;

    /// Moves PENDING installments due before `now` to OVERDUE.
    ///
    /// Called by the external scheduler. Returns the number of rows changed.
    async fn mark_overdue_installments(&self, now: Timestamp) -> Result<u64, DomainError>;
}

/// One atomic unit of billing work.
#[async_trait]
pub trait BillingTransaction: Send {
    // ── Collaborators ──────────────────────────────────────────────

    async fn person_exists(&mut self, id: PersonId) -> Result<bool, DomainError>;

    async fn find_event(&mut self, id: EventId) -> Result<Option<EventInfo>, DomainError>;

    /// Creates or updates the person's registration for the event.
    async fn upsert_registration(
        &mut self,
        person_id: PersonId,
        event_id: EventId,
        status: RegistrationStatus,
        now: Timestamp,
    ) -> Result<Registration, DomainError>;

    // ── Numbering ──────────────────────────────────────────────────

    /// Next value of the scope's counter, starting at 1.
    async fn next_sequence(&mut self, scope: NumberScope) -> Result<i64, DomainError>;

    /// True when `number` is already used by an entity of the scope's kind.
    async fn number_taken(&mut self, scope: NumberScope, number: &str)
        -> Result<bool, DomainError>;

    // ── Inserts ────────────────────────────────────────────────────

    /// Fails with `ErrorCode::Conflict` on a duplicate invoice number.
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError>;

    async fn insert_installments(&mut self, installments: &[Installment])
        -> Result<(), DomainError>;

    /// Fails with `ErrorCode::Conflict` on a duplicate ticket number or scan code.
    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), DomainError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;

    // ── Reads ──────────────────────────────────────────────────────

    async fn find_invoice_id_for_installment(
        &mut self,
        id: InstallmentId,
    ) -> Result<Option<InvoiceId>, DomainError>;

    async fn find_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, DomainError>;

    /// Payments carrying the gateway payment reference, oldest first.
    async fn find_payments_by_payment_ref(
        &mut self,
        reference: &str,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Payments carrying the gateway charge reference, oldest first.
    async fn find_payments_by_charge_ref(
        &mut self,
        reference: &str,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Installments of an invoice ordered by number.
    async fn list_installments(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Installment>, DomainError>;

    /// Payments of an installment, oldest first.
    async fn list_payments(
        &mut self,
        installment_id: InstallmentId,
    ) -> Result<Vec<Payment>, DomainError>;

    // ── Locking reads ──────────────────────────────────────────────

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, DomainError>;

    async fn lock_installment(
        &mut self,
        id: InstallmentId,
    ) -> Result<Option<Installment>, DomainError>;

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, DomainError>;

    // ── Updates ────────────────────────────────────────────────────

    async fn update_invoice_status(&mut self, invoice: &Invoice) -> Result<(), DomainError>;

    async fn update_installment(&mut self, installment: &Installment) -> Result<(), DomainError>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;

    /// PENDING -> ACTIVE for every ticket of the invoice. Returns rows changed.
    async fn activate_tickets(
        &mut self,
        invoice_id: InvoiceId,
        now: Timestamp,
    ) -> Result<u64, DomainError>;

    /// ACTIVE -> PENDING for every ticket of the invoice. Returns rows changed.
    async fn deactivate_tickets(
        &mut self,
        invoice_id: InvoiceId,
        now: Timestamp,
    ) -> Result<u64, DomainError>;

    // ── Webhook event log ──────────────────────────────────────────

    async fn find_webhook_event(
        &mut self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Inserts the record, or replaces an existing `failed` one.
    ///
    /// Returns `AlreadyExists` when a final record is already present,
    /// including one committed concurrently by another delivery.
    async fn save_webhook_event(
        &mut self,
        record: &WebhookEventRecord,
    ) -> Result<SaveResult, DomainError>;

    // ── Completion ─────────────────────────────────────────────────

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_object_safe() {
        fn _store(_s: &dyn BillingStore) {}
        fn _tx(_t: Box<dyn BillingTransaction>) {}
    }
}
