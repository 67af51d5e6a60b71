//! GetInvoiceHandler - Query handler for the full invoice graph.

use std::sync::Arc;

use crate::domain::billing::{BillingError, InvoiceGraph};
use crate::domain::foundation::InvoiceId;
use crate::ports::BillingStore;

/// Query for one invoice with its installments, payments and tickets.
#[derive(Debug, Clone)]
pub struct GetInvoiceQuery {
    pub invoice_id: InvoiceId,
}

pub struct GetInvoiceHandler {
    store: Arc<dyn BillingStore>,
}

impl GetInvoiceHandler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: GetInvoiceQuery) -> Result<InvoiceGraph, BillingError> {
        self.store
            .load_invoice_graph(query.invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Invoice", query.invoice_id))
    }
}
