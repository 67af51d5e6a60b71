//! Fixtures shared by the billing handler tests.

use std::sync::Arc;

use crate::adapters::memory::InMemoryBillingStore;
use crate::domain::billing::{EventInfo, InvoiceGraph, NewPayment, Payment, PaymentMethod};
use crate::domain::foundation::{EventId, InstallmentId, Money, PersonId, Timestamp, UserId};
use crate::ports::BillingStore;

use super::{
    GenerateInvoiceCommand, GenerateInvoiceHandler, NumberingPolicy, RecordPaymentCommand,
    RecordPaymentHandler, RecordPaymentResult,
};

pub(crate) async fn seeded_store(event_name: &str) -> (InMemoryBillingStore, PersonId, EventId) {
    let store = InMemoryBillingStore::new();
    let (person_id, event_id) = seed(&store, event_name).await;
    (store, person_id, event_id)
}

async fn seed(store: &InMemoryBillingStore, event_name: &str) -> (PersonId, EventId) {
    let person_id = PersonId::new();
    let event_id = EventId::new();
    store.add_person(person_id).await;
    store
        .add_event(EventInfo {
            id: event_id,
            name: event_name.to_string(),
        })
        .await;
    (person_id, event_id)
}

pub(crate) fn command(
    person_id: PersonId,
    event_id: EventId,
    cents: i64,
    installments: u32,
    tickets: u32,
) -> GenerateInvoiceCommand {
    GenerateInvoiceCommand {
        person_id,
        event_id,
        total_amount: Money::from_cents(cents).unwrap(),
        installments,
        ticket_quantity: tickets,
        ticket_type: "STANDARD".to_string(),
        created_by: UserId::new("staff-1").unwrap(),
    }
}

/// Generates an invoice for a freshly seeded person and event.
pub(crate) async fn generate(
    store: &InMemoryBillingStore,
    cents: i64,
    installments: u32,
    tickets: u32,
) -> InvoiceGraph {
    let (person_id, event_id) = seed(store, "Summer Camp").await;
    GenerateInvoiceHandler::new(Arc::new(store.clone()), NumberingPolicy::default())
        .handle(command(person_id, event_id, cents, installments, tickets))
        .await
        .unwrap()
}

pub(crate) fn manual_payment(
    installment_id: InstallmentId,
    cents: i64,
    reference: Option<&str>,
) -> RecordPaymentCommand {
    RecordPaymentCommand {
        installment_id,
        method: PaymentMethod::Pix,
        amount: Money::from_cents(cents).unwrap(),
        external_payment_ref: reference.map(str::to_owned),
        external_charge_ref: None,
        note: None,
    }
}

pub(crate) async fn settle(
    store: &InMemoryBillingStore,
    installment_id: InstallmentId,
    reference: Option<&str>,
) -> RecordPaymentResult {
    let cents = store
        .installment(installment_id)
        .await
        .map(|i| i.amount.cents() as i64)
        .unwrap_or(1);
    RecordPaymentHandler::new(Arc::new(store.clone()), NumberingPolicy::default())
        .handle(manual_payment(installment_id, cents, reference))
        .await
        .unwrap()
}

/// Inserts a PENDING gateway attempt, as a started checkout leaves behind.
pub(crate) async fn pending_payment(
    store: &InMemoryBillingStore,
    installment_id: InstallmentId,
    reference: &str,
) -> Payment {
    let amount = store
        .installment(installment_id)
        .await
        .map(|i| i.amount)
        .unwrap_or_else(|| Money::from_cents(1).unwrap());
    let payment = Payment::pending(
        NewPayment {
            number: format!("PAY-TEST-{}", reference),
            installment_id,
            amount,
            method: PaymentMethod::CreditCard,
            external_payment_ref: Some(reference.to_string()),
            external_charge_ref: None,
            note: None,
        },
        Timestamp::now(),
    );
    let mut tx = store.begin().await.unwrap();
    tx.insert_payment(&payment).await.unwrap();
    tx.commit().await.unwrap();
    payment
}
