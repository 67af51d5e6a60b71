//! In-memory billing store.
//!
//! Mirrors the PostgreSQL adapter's semantics closely enough to drive the
//! application handlers in tests and local runs:
//!
//! - A transaction holds the store-wide lock for its whole lifetime, so
//!   transactions are fully serialized (stronger than row locks, never weaker).
//! - Writes go to a private working copy, published only on commit.
//!   Dropping or rolling back discards them.
//! - Unique constraints (invoice/payment/ticket numbers, scan codes, one PAID
//!   payment per installment) fail with `ErrorCode::Conflict`.
//!
//! # Security Note
//!
//! This adapter is for **testing and local development only**.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::billing::{
    EventInfo, Installment, InstallmentWithPayments, Invoice, InvoiceGraph, NumberScope, Payment,
    PaymentStatus, Registration, RegistrationStatus, Ticket, TicketStatus,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, EventId, InstallmentId, InvoiceId, PaymentId, PersonId,
    RegistrationId, TicketId, Timestamp,
};
use crate::ports::{BillingStore, BillingTransaction, SaveResult, WebhookEventRecord};

/// Store operations that can be made to fail once, for rollback tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertTickets,
    InsertPayment,
    UpdateInvoiceStatus,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct BillingState {
    people: HashSet<PersonId>,
    events: HashMap<EventId, EventInfo>,
    registrations: HashMap<(PersonId, EventId), Registration>,
    sequences: HashMap<String, i64>,
    invoices: HashMap<InvoiceId, Invoice>,
    installments: HashMap<InstallmentId, Installment>,
    /// Insertion order doubles as creation order.
    payments: Vec<Payment>,
    tickets: Vec<Ticket>,
    webhook_events: HashMap<String, WebhookEventRecord>,
}

/// In-memory implementation of the BillingStore port.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryBillingStore::new();
/// store.add_person(person_id).await;
/// store.add_event(EventInfo { id: event_id, name: "Summer Camp".into() }).await;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<Mutex<BillingState>>,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Registers a person the generator can bill.
    pub async fn add_person(&self, id: PersonId) {
        self.state.lock().await.people.insert(id);
    }

    /// Registers an event the generator can bill for.
    pub async fn add_event(&self, event: EventInfo) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// Sets a numbering counter, e.g. to simulate numbers taken elsewhere.
    pub async fn set_sequence(&self, scope: NumberScope, last_value: i64) {
        self.state
            .lock()
            .await
            .sequences
            .insert(scope.key(), last_value);
    }

    pub async fn registration(
        &self,
        person_id: PersonId,
        event_id: EventId,
    ) -> Option<Registration> {
        self.state
            .lock()
            .await
            .registrations
            .get(&(person_id, event_id))
            .cloned()
    }

    pub async fn invoice_count(&self) -> usize {
        self.state.lock().await.invoices.len()
    }

    pub async fn installment(&self, id: InstallmentId) -> Option<Installment> {
        self.state.lock().await.installments.get(&id).cloned()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    /// Forces a ticket into `status`, e.g. one cancelled or scanned at the door.
    pub async fn set_ticket_status(&self, id: TicketId, status: TicketStatus) {
        let mut state = self.state.lock().await;
        if let Some(ticket) = state.tickets.iter_mut().find(|t| t.id == id) {
            ticket.status = status;
        }
    }

    pub async fn webhook_event(&self, event_id: &str) -> Option<WebhookEventRecord> {
        self.state.lock().await.webhook_events.get(event_id).cloned()
    }

    /// Makes the next call of `point` fail with a database error.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_once(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .expect("InMemoryBillingStore: fail point lock poisoned")
            .insert(point);
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryBillingTransaction {
            guard,
            working,
            fail_points: self.fail_points.clone(),
        }))
    }

    async fn load_invoice_graph(
        &self,
        id: InvoiceId,
    ) -> Result<Option<InvoiceGraph>, DomainError> {
        let state = self.state.lock().await;
        let invoice = match state.invoices.get(&id) {
            Some(invoice) => invoice.clone(),
            None => return Ok(None),
        };

        let installments = sorted_installments(&state, id)
            .into_iter()
            .map(|installment| {
                let payments = state
                    .payments
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

        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.invoice_id == id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.number.cmp(&b.number));

        Ok(Some(InvoiceGraph {
            invoice,
            installments,
            tickets,
        }))
    }

    async fn mark_overdue_installments(&self, now: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.state.lock().await;
        let changed = state
            .installments
            .values_mut()
            .map(|installment| installment.mark_overdue_if_due(now))
            .filter(|changed| *changed)
            .count();
        Ok(changed as u64)
    }
}

/// A serialized in-memory transaction.
pub struct InMemoryBillingTransaction {
    guard: OwnedMutexGuard<BillingState>,
    working: BillingState,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl InMemoryBillingTransaction {
    fn check_fail_point(&self, point: FailPoint) -> Result<(), DomainError> {
        let fired = self
            .fail_points
            .lock()
            .expect("InMemoryBillingStore: fail point lock poisoned")
            .remove(&point);
        if fired {
            return Err(DomainError::database(
                "Injected failure",
                format!("{:?}", point),
            ));
        }
        Ok(())
    }

    fn payment_index(&self, id: PaymentId) -> Option<usize> {
        self.working.payments.iter().position(|p| p.id == id)
    }

    /// One PAID payment per installment, like the partial unique index.
    fn check_single_paid(&self, payment: &Payment) -> Result<(), DomainError> {
        if payment.status != PaymentStatus::Paid {
            return Ok(());
        }
        let clash = self.working.payments.iter().any(|p| {
            p.id != payment.id
                && p.installment_id == payment.installment_id
                && p.status == PaymentStatus::Paid
        });
        if clash {
            return Err(conflict("payments_one_paid_per_installment"));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingTransaction for InMemoryBillingTransaction {
    async fn person_exists(&mut self, id: PersonId) -> Result<bool, DomainError> {
        Ok(self.working.people.contains(&id))
    }

    async fn find_event(&mut self, id: EventId) -> Result<Option<EventInfo>, DomainError> {
        Ok(self.working.events.get(&id).cloned())
    }

    async fn upsert_registration(
        &mut self,
        person_id: PersonId,
        event_id: EventId,
        status: RegistrationStatus,
        now: Timestamp,
    ) -> Result<Registration, DomainError> {
        let registration = self
            .working
            .registrations
            .entry((person_id, event_id))
            .and_modify(|r| {
                r.status = status;
                r.updated_at = now;
            })
            .or_insert_with(|| Registration {
                id: RegistrationId::new(),
                person_id,
                event_id,
                status,
                updated_at: now,
            });
        Ok(registration.clone())
    }

    async fn next_sequence(&mut self, scope: NumberScope) -> Result<i64, DomainError> {
        let value = self.working.sequences.entry(scope.key()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn number_taken(
        &mut self,
        scope: NumberScope,
        number: &str,
    ) -> Result<bool, DomainError> {
        let state = &self.working;
        Ok(match scope {
            NumberScope::Invoice { .. } => state.invoices.values().any(|i| i.number == number),
            NumberScope::Payment { .. } => state.payments.iter().any(|p| p.number == number),
            NumberScope::Ticket { .. } => state.tickets.iter().any(|t| t.number == number),
        })
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        if !self.working.people.contains(&invoice.person_id)
            || !self.working.events.contains_key(&invoice.event_id)
        {
            return Err(DomainError::database(
                "Failed to insert invoice",
                "foreign key violation",
            ));
        }
        if self
            .working
            .invoices
            .values()
            .any(|i| i.number == invoice.number)
        {
            return Err(conflict("invoices_number_key"));
        }
        self.working.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn insert_installments(
        &mut self,
        installments: &[Installment],
    ) -> Result<(), DomainError> {
        for installment in installments {
            if !self.working.invoices.contains_key(&installment.invoice_id) {
                return Err(DomainError::database(
                    "Failed to insert installment",
                    "foreign key violation",
                ));
            }
            self.working
                .installments
                .insert(installment.id, installment.clone());
        }
        Ok(())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), DomainError> {
        self.check_fail_point(FailPoint::InsertTickets)?;
        for ticket in tickets {
            if self.working.tickets.iter().any(|t| t.number == ticket.number) {
                return Err(conflict("tickets_number_key"));
            }
            if self
                .working
                .tickets
                .iter()
                .any(|t| t.scan_code == ticket.scan_code)
            {
                return Err(conflict("tickets_scan_code_key"));
            }
            self.working.tickets.push(ticket.clone());
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        self.check_fail_point(FailPoint::InsertPayment)?;
        if !self
            .working
            .installments
            .contains_key(&payment.installment_id)
        {
            return Err(DomainError::database(
                "Failed to insert payment",
                "foreign key violation",
            ));
        }
        if self
            .working
            .payments
            .iter()
            .any(|p| p.number == payment.number)
        {
            return Err(conflict("payments_number_key"));
        }
        self.check_single_paid(payment)?;
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn find_invoice_id_for_installment(
        &mut self,
        id: InstallmentId,
    ) -> Result<Option<InvoiceId>, DomainError> {
        Ok(self.working.installments.get(&id).map(|i| i.invoice_id))
    }

    async fn find_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.payment_index(id).map(|i| self.working.payments[i].clone()))
    }

    async fn find_payments_by_payment_ref(
        &mut self,
        reference: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.external_payment_ref.as_deref() == Some(reference))
            .cloned()
            .collect())
    }

    async fn find_payments_by_charge_ref(
        &mut self,
        reference: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.external_charge_ref.as_deref() == Some(reference))
            .cloned()
            .collect())
    }

    async fn list_installments(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Installment>, DomainError> {
        Ok(sorted_installments(&self.working, invoice_id))
    }

    async fn list_payments(
        &mut self,
        installment_id: InstallmentId,
    ) -> Result<Vec<Payment>, DomainError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.installment_id == installment_id)
            .cloned()
            .collect())
    }

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, DomainError> {
        Ok(self.working.invoices.get(&id).cloned())
    }

    async fn lock_installment(
        &mut self,
        id: InstallmentId,
    ) -> Result<Option<Installment>, DomainError> {
        Ok(self.working.installments.get(&id).cloned())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        self.find_payment(id).await
    }

    async fn update_invoice_status(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        self.check_fail_point(FailPoint::UpdateInvoiceStatus)?;
        match self.working.invoices.get_mut(&invoice.id) {
            Some(stored) => {
                stored.status = invoice.status;
                stored.updated_at = invoice.updated_at;
                Ok(())
            }
            None => Err(DomainError::new(ErrorCode::InvoiceNotFound, "Invoice not found")
                .with_detail("id", invoice.id.to_string())),
        }
    }

    async fn update_installment(&mut self, installment: &Installment) -> Result<(), DomainError> {
        match self.working.installments.get_mut(&installment.id) {
            Some(stored) => {
                stored.status = installment.status;
                stored.paid_at = installment.paid_at;
                stored.updated_at = installment.updated_at;
                Ok(())
            }
            None => Err(
                DomainError::new(ErrorCode::InstallmentNotFound, "Installment not found")
                    .with_detail("id", installment.id.to_string()),
            ),
        }
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        let index = self.payment_index(payment.id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, "Payment not found")
                .with_detail("id", payment.id.to_string())
        })?;
        self.check_single_paid(payment)?;

        let stored = &mut self.working.payments[index];
        stored.status = payment.status;
        stored.external_charge_ref = payment.external_charge_ref.clone();
        stored.note = payment.note.clone();
        stored.paid_at = payment.paid_at;
        stored.updated_at = payment.updated_at;
        Ok(())
    }

    async fn activate_tickets(
        &mut self,
        invoice_id: InvoiceId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        let changed = self
            .working
            .tickets
            .iter_mut()
            .filter(|t| t.invoice_id == invoice_id)
            .map(|t| t.activate(now))
            .filter(|changed| *changed)
            .count();
        Ok(changed as u64)
    }

    async fn deactivate_tickets(
        &mut self,
        invoice_id: InvoiceId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        let changed = self
            .working
            .tickets
            .iter_mut()
            .filter(|t| t.invoice_id == invoice_id)
            .map(|t| t.deactivate(now))
            .filter(|changed| *changed)
            .count();
        Ok(changed as u64)
    }

    async fn find_webhook_event(
        &mut self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.working.webhook_events.get(event_id).cloned())
    }

    async fn save_webhook_event(
        &mut self,
        record: &WebhookEventRecord,
    ) -> Result<SaveResult, DomainError> {
        if let Some(existing) = self.working.webhook_events.get(&record.event_id) {
            if existing.is_final() {
                return Ok(SaveResult::AlreadyExists);
            }
        }
        self.working
            .webhook_events
            .insert(record.event_id.clone(), record.clone());
        Ok(SaveResult::Inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.check_fail_point(FailPoint::Commit)?;
        let InMemoryBillingTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

fn sorted_installments(state: &BillingState, invoice_id: InvoiceId) -> Vec<Installment> {
    let mut installments: Vec<Installment> = state
        .installments
        .values()
        .filter(|i| i.invoice_id == invoice_id)
        .cloned()
        .collect();
    installments.sort_by_key(|i| i.number);
    installments
}

fn conflict(constraint: &str) -> DomainError {
    DomainError::new(
        ErrorCode::Conflict,
        format!("duplicate value for {}", constraint),
    )
    .with_detail("constraint", constraint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{InstallmentStatus, InvoiceStatus, PaymentMethod};
    use crate::domain::foundation::{Money, UserId};

    fn invoice(person_id: PersonId, event_id: EventId) -> Invoice {
        let now = Timestamp::now();
        Invoice {
            id: InvoiceId::new(),
            number: "INV-2026-000001".to_string(),
            person_id,
            event_id,
            total_amount: Money::from_cents(10_000).unwrap(),
            status: InvoiceStatus::Pending,
            created_by: UserId::new("staff-1").unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    fn installment(invoice_id: InvoiceId) -> Installment {
        let now = Timestamp::now();
        Installment {
            id: InstallmentId::new(),
            invoice_id,
            number: 1,
            amount: Money::from_cents(10_000).unwrap(),
            due_at: now,
            status: InstallmentStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded() -> (InMemoryBillingStore, PersonId, EventId) {
        let store = InMemoryBillingStore::new();
        let person_id = PersonId::new();
        let event_id = EventId::new();
        store.add_person(person_id).await;
        store
            .add_event(EventInfo {
                id: event_id,
                name: "Summer Camp".to_string(),
            })
            .await;
        (store, person_id, event_id)
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let (store, person_id, event_id) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_invoice(&invoice(person_id, event_id)).await.unwrap();
        drop(tx);

        assert_eq!(store.invoice_count().await, 0);
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let (store, person_id, event_id) = seeded().await;
        let inv = invoice(person_id, event_id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_invoice(&inv).await.unwrap();
        tx.insert_installments(&[installment(inv.id)]).await.unwrap();
        tx.commit().await.unwrap();

        let graph = store.load_invoice_graph(inv.id).await.unwrap().unwrap();
        assert_eq!(graph.invoice, inv);
        assert_eq!(graph.installments.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_invoice_number_conflicts() {
        let (store, person_id, event_id) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_invoice(&invoice(person_id, event_id)).await.unwrap();
        let err = tx
            .insert_invoice(&invoice(person_id, event_id))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn second_paid_payment_for_installment_conflicts() {
        let (store, person_id, event_id) = seeded().await;
        let inv = invoice(person_id, event_id);
        let inst = installment(inv.id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_invoice(&inv).await.unwrap();
        tx.insert_installments(&[inst.clone()]).await.unwrap();

        let paid = |number: &str| {
            Payment::paid(
                crate::domain::billing::NewPayment {
                    number: number.to_string(),
                    installment_id: inst.id,
                    amount: inst.amount,
                    method: PaymentMethod::Cash,
                    external_payment_ref: None,
                    external_charge_ref: None,
                    note: None,
                },
                Timestamp::now(),
            )
        };
        tx.insert_payment(&paid("PAY-2026-000001")).await.unwrap();
        let err = tx.insert_payment(&paid("PAY-2026-000002")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn failed_webhook_records_can_be_replaced() {
        let (store, _, _) = seeded().await;
        let payload = serde_json::json!({});

        let mut tx = store.begin().await.unwrap();
        let failed = WebhookEventRecord::failed("evt_1", "charge.refunded", "boom", payload.clone());
        assert_eq!(tx.save_webhook_event(&failed).await.unwrap(), SaveResult::Inserted);
        let ok = WebhookEventRecord::success("evt_1", "charge.refunded", payload.clone());
        assert_eq!(tx.save_webhook_event(&ok).await.unwrap(), SaveResult::Inserted);
        let again = WebhookEventRecord::success("evt_1", "charge.refunded", payload);
        assert_eq!(tx.save_webhook_event(&again).await.unwrap(), SaveResult::AlreadyExists);
    }

    #[tokio::test]
    async fn fail_point_fires_once() {
        let (store, _, _) = seeded().await;
        store.fail_once(FailPoint::Commit);

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_err());
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn overdue_sweep_only_touches_past_due_pending() {
        let (store, person_id, event_id) = seeded().await;
        let inv = invoice(person_id, event_id);
        let mut due = installment(inv.id);
        due.due_at = Timestamp::now().add_days(-2);
        let mut later = installment(inv.id);
        later.number = 2;
        later.due_at = Timestamp::now().add_days(30);

        let mut tx = store.begin().await.unwrap();
        tx.insert_invoice(&inv).await.unwrap();
        tx.insert_installments(&[due.clone(), later.clone()]).await.unwrap();
        tx.commit().await.unwrap();

        let changed = store
            .mark_overdue_installments(Timestamp::now())
            .await
            .unwrap();

        assert_eq!(changed, 1);
        let graph = store.load_invoice_graph(inv.id).await.unwrap().unwrap();
        assert_eq!(graph.installments[0].installment.status, InstallmentStatus::Overdue);
        assert_eq!(graph.installments[1].installment.status, InstallmentStatus::Pending);
    }
}
