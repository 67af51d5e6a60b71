//! RecomputeInvoiceStatusHandler - Invoice status aggregator.
//!
//! Derives the invoice status from its installments and applies the ticket
//! action that goes with it. Invoked by the ledger and the canceller inside
//! their own transactions after every installment change. Safe to call
//! redundantly: the same snapshot always yields the same writes.

use std::sync::Arc;

use tracing::info;

use crate::domain::billing::{aggregate, BillingError, Invoice, TicketAction};
use crate::domain::foundation::{InvoiceId, Timestamp};
use crate::ports::{BillingStore, BillingTransaction};

use super::transaction::finish;

/// Command to recompute an invoice's status.
#[derive(Debug, Clone)]
pub struct RecomputeInvoiceStatusCommand {
    pub invoice_id: InvoiceId,
}

/// Result of recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeInvoiceStatusResult {
    pub invoice: Invoice,
    /// Whether the invoice status changed.
    pub status_changed: bool,
    pub tickets_activated: u64,
    pub tickets_deactivated: u64,
}

/// Standalone entry point, e.g. for operator repair after manual edits.
pub struct RecomputeInvoiceStatusHandler {
    store: Arc<dyn BillingStore>,
}

impl RecomputeInvoiceStatusHandler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        cmd: RecomputeInvoiceStatusCommand,
    ) -> Result<RecomputeInvoiceStatusResult, BillingError> {
        let mut tx = self.store.begin().await?;
        let result = recompute_invoice_status(tx.as_mut(), cmd.invoice_id, Timestamp::now()).await;
        finish(tx, result).await
    }
}

/// Recomputes inside the caller's transaction.
///
/// Locks the invoice row first; callers that already hold it keep it.
pub(crate) async fn recompute_invoice_status(
    tx: &mut dyn BillingTransaction,
    invoice_id: InvoiceId,
    now: Timestamp,
) -> Result<RecomputeInvoiceStatusResult, BillingError> {
    let mut invoice = tx
        .lock_invoice(invoice_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))?;

    let statuses: Vec<_> = tx
        .list_installments(invoice_id)
        .await?
        .iter()
        .map(|i| i.status)
        .collect();
    let previous = invoice.status;
    let decision = aggregate(previous, &statuses);

    let status_changed = invoice.apply_status(decision.status, now);
    if status_changed {
        tx.update_invoice_status(&invoice).await?;
    }

    let (tickets_activated, tickets_deactivated) = match decision.tickets {
        TicketAction::ActivateAll => (tx.activate_tickets(invoice_id, now).await?, 0),
        TicketAction::DeactivateAll => (0, tx.deactivate_tickets(invoice_id, now).await?),
        TicketAction::Leave => (0, 0),
    };

    if status_changed || tickets_activated > 0 || tickets_deactivated > 0 {
        info!(
            invoice_id = %invoice_id,
            from = %previous,
            to = %invoice.status,
            tickets_activated,
            tickets_deactivated,
            "Invoice status recomputed"
        );
    }

    Ok(RecomputeInvoiceStatusResult {
        invoice,
        status_changed,
        tickets_activated,
        tickets_deactivated,
    })
}
