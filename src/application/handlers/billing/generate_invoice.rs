//! GenerateInvoiceHandler - Command handler for invoice generation.
//!
//! Creates the invoice, its installment schedule, its tickets and the
//! confirmed registration in one transaction. Nothing is visible unless all
//! of it is.

use std::sync::Arc;

use tracing::info;

use crate::domain::billing::{
    aggregate, installment_schedule, invoice_number, new_scan_code, ticket_number, ticket_prices,
    BillingError, EventInfo, Installment, InstallmentWithPayments, Invoice, InvoiceGraph,
    InvoiceRequest, InvoiceStatus, NumberScope, RegistrationStatus, Ticket, TicketAction, TicketStatus,
};
use crate::domain::foundation::{EventId, InvoiceId, Money, PersonId, TicketId, Timestamp, UserId};
use crate::ports::{BillingStore, BillingTransaction};

use super::numbering::{allocate_number, NumberingPolicy};
use super::transaction::finish;

/// Command to generate an invoice.
#[derive(Debug, Clone)]
pub struct GenerateInvoiceCommand {
    pub person_id: PersonId,
    pub event_id: EventId,
    pub total_amount: Money,
    pub installments: u32,
    pub ticket_quantity: u32,
    pub ticket_type: String,
    pub created_by: UserId,
}

impl GenerateInvoiceCommand {
    fn request(&self) -> InvoiceRequest {
        InvoiceRequest {
            person_id: self.person_id,
            event_id: self.event_id,
            total_amount: self.total_amount,
            installments: self.installments,
            ticket_quantity: self.ticket_quantity,
            ticket_type: self.ticket_type.trim().to_string(),
            created_by: self.created_by.clone(),
        }
    }
}

/// Handler for invoice generation.
pub struct GenerateInvoiceHandler {
    store: Arc<dyn BillingStore>,
    numbering: NumberingPolicy,
}

impl GenerateInvoiceHandler {
    pub fn new(store: Arc<dyn BillingStore>, numbering: NumberingPolicy) -> Self {
        Self { store, numbering }
    }

    pub async fn handle(&self, cmd: GenerateInvoiceCommand) -> Result<InvoiceGraph, BillingError> {
        // 1. Validate before touching the store
        let request = cmd.request();
        request.validate()?;

        // 2. Everything else happens in one transaction
        let mut tx = self.store.begin().await?;
        let result = self.generate(tx.as_mut(), request, Timestamp::now()).await;
        let graph = finish(tx, result).await?;

        info!(
            invoice_id = %graph.invoice.id,
            invoice_number = %graph.invoice.number,
            person_id = %graph.invoice.person_id,
            event_id = %graph.invoice.event_id,
            total = %graph.invoice.total_amount,
            installments = graph.installments.len(),
            tickets = graph.tickets.len(),
            "Invoice generated"
        );

        Ok(graph)
    }

    async fn generate(
        &self,
        tx: &mut dyn BillingTransaction,
        request: InvoiceRequest,
        now: Timestamp,
    ) -> Result<InvoiceGraph, BillingError> {
        if !tx.person_exists(request.person_id).await? {
            return Err(BillingError::not_found("Person", request.person_id));
        }
        let event = tx
            .find_event(request.event_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Event", request.event_id))?;

        let year = now.year();
        let number = allocate_number(
            tx,
            NumberScope::Invoice { year },
            &self.numbering,
            |seq| invoice_number(&self.numbering.invoice_prefix, year, seq),
        )
        .await?;

        let invoice_id = InvoiceId::new();
        let installments = installment_schedule(
            invoice_id,
            request.total_amount,
            request.installments,
            now,
        )?;

        // Initial invoice and ticket status follow the aggregation rule.
        let statuses: Vec<_> = installments.iter().map(|i| i.status).collect();
        let decision = aggregate(InvoiceStatus::Pending, &statuses);
        let invoice = Invoice {
            id: invoice_id,
            number,
            person_id: request.person_id,
            event_id: request.event_id,
            total_amount: request.total_amount,
            status: decision.status,
            created_by: request.created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        let ticket_status = match decision.tickets {
            TicketAction::ActivateAll => TicketStatus::Active,
            TicketAction::Leave | TicketAction::DeactivateAll => TicketStatus::Pending,
        };

        let tickets = self
            .tickets(tx, &invoice, &event, &request, ticket_status, now)
            .await?;

        tx.insert_invoice(&invoice).await?;
        tx.insert_installments(&installments).await?;
        tx.insert_tickets(&tickets).await?;
        tx.upsert_registration(
            request.person_id,
            request.event_id,
            RegistrationStatus::Confirmed,
            now,
        )
        .await?;

        Ok(graph(invoice, installments, tickets))
    }

    async fn tickets(
        &self,
        tx: &mut dyn BillingTransaction,
        invoice: &Invoice,
        event: &EventInfo,
        request: &InvoiceRequest,
        status: TicketStatus,
        now: Timestamp,
    ) -> Result<Vec<Ticket>, BillingError> {
        let year = now.year();
        let scope = NumberScope::Ticket {
            event_id: event.id,
            year,
        };
        let prices = ticket_prices(request.total_amount, request.ticket_quantity)?;

        let mut tickets = Vec::with_capacity(prices.len());
        for price in prices {
            let number = allocate_number(tx, scope, &self.numbering, |seq| {
                ticket_number(event.id, &event.name, year, seq)
            })
            .await?;
            tickets.push(Ticket {
                id: TicketId::new(),
                invoice_id: invoice.id,
                event_id: event.id,
                person_id: invoice.person_id,
                number,
                scan_code: new_scan_code(),
                ticket_type: request.ticket_type.clone(),
                price,
                status,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(tickets)
    }
}

fn graph(invoice: Invoice, installments: Vec<Installment>, tickets: Vec<Ticket>) -> InvoiceGraph {
    InvoiceGraph {
        invoice,
        installments: installments
            .into_iter()
            .map(|installment| InstallmentWithPayments {
                installment,
                payments: Vec::new(),
            })
            .collect(),
        tickets,
    }
}
