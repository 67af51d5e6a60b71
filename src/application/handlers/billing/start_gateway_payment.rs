//! StartGatewayPaymentHandler - Lazy payment intent creation.
//!
//! Opens a gateway payment intent for one installment and records the
//! attempt as a PENDING payment. The gateway call happens outside any
//! transaction; the installment is re-checked under lock afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::domain::billing::{
    payment_number, BillingError, Installment, InstallmentStatus, InvoiceGraph, NewPayment,
    NumberScope, Payment, PaymentMethod,
};
use crate::domain::foundation::{DomainError, InstallmentId, PaymentId, Timestamp};
use crate::ports::{
    BillingStore, BillingTransaction, CreatePaymentIntentRequest, PaymentGateway, PaymentIntent,
};

use super::numbering::{allocate_number, NumberingPolicy};
use super::transaction::finish;

/// Command to start a gateway payment for an installment.
#[derive(Debug, Clone)]
pub struct StartGatewayPaymentCommand {
    pub installment_id: InstallmentId,
    pub method: PaymentMethod,
}

/// Result of starting a gateway payment.
#[derive(Debug, Clone)]
pub struct StartGatewayPaymentResult {
    pub payment: Payment,
    /// Handed to the payer's browser to confirm the intent.
    pub client_secret: Option<String>,
}

/// Handler for gateway checkout.
pub struct StartGatewayPaymentHandler {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    numbering: NumberingPolicy,
}

impl StartGatewayPaymentHandler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        numbering: NumberingPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            numbering,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartGatewayPaymentCommand,
    ) -> Result<StartGatewayPaymentResult, BillingError> {
        if !cmd.method.is_gateway_supported() {
            return Err(BillingError::validation(
                "method",
                format!("{} cannot be collected through the gateway", cmd.method),
            ));
        }

        // 1. Read the installment and check it still takes payments
        let graph = self.load_graph(cmd.installment_id).await?;
        let (installment, paid_by) = find_installment(&graph, cmd.installment_id)?;
        ensure_payable(installment, paid_by)?;

        // 2. Open the intent, keyed by the payment id it will be stored under
        let payment_id = PaymentId::new();
        let intent = self
            .gateway
            .create_payment_intent(intent_request(&graph, installment, cmd.method, payment_id))
            .await
            .map_err(DomainError::from)?;

        // 3. Record the attempt, unless the installment settled meanwhile
        let mut tx = self.store.begin().await?;
        let result = self
            .record_attempt(tx.as_mut(), &cmd, payment_id, &intent, Timestamp::now())
            .await;
        let payment = finish(tx, result).await?;

        info!(
            payment_id = %payment.id,
            installment_id = %payment.installment_id,
            payment_reference = %intent.id,
            "Gateway payment started"
        );

        Ok(StartGatewayPaymentResult {
            payment,
            client_secret: intent.client_secret,
        })
    }

    async fn load_graph(&self, installment_id: InstallmentId) -> Result<InvoiceGraph, BillingError> {
        let mut tx = self.store.begin().await?;
        let lookup = tx.find_invoice_id_for_installment(installment_id).await;
        tx.rollback().await?;
        let invoice_id =
            lookup?.ok_or_else(|| BillingError::not_found("Installment", installment_id))?;

        self.store
            .load_invoice_graph(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))
    }

    async fn record_attempt(
        &self,
        tx: &mut dyn BillingTransaction,
        cmd: &StartGatewayPaymentCommand,
        payment_id: PaymentId,
        intent: &PaymentIntent,
        now: Timestamp,
    ) -> Result<Payment, BillingError> {
        let installment_id = cmd.installment_id;
        let invoice_id = tx
            .find_invoice_id_for_installment(installment_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Installment", installment_id))?;
        tx.lock_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))?;
        let installment = tx
            .lock_installment(installment_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Installment", installment_id))?;
        let payments = tx.list_payments(installment_id).await?;
        ensure_payable(&installment, payments.iter().find(|p| p.is_paid()))?;

        let year = now.year();
        let number = allocate_number(tx, NumberScope::Payment { year }, &self.numbering, |seq| {
            payment_number(year, seq)
        })
        .await?;
        let mut payment = Payment::pending(
            NewPayment {
                number,
                installment_id,
                amount: installment.amount,
                method: cmd.method,
                external_payment_ref: Some(intent.id.clone()),
                external_charge_ref: None,
                note: None,
            },
            now,
        );
        payment.id = payment_id;
        tx.insert_payment(&payment).await?;
        Ok(payment)
    }
}

fn find_installment(
    graph: &InvoiceGraph,
    installment_id: InstallmentId,
) -> Result<(&Installment, Option<&Payment>), BillingError> {
    graph
        .installments
        .iter()
        .find(|i| i.installment.id == installment_id)
        .map(|i| {
            (
                &i.installment,
                i.payments.iter().find(|p| p.is_paid()),
            )
        })
        .ok_or_else(|| BillingError::not_found("Installment", installment_id))
}

fn ensure_payable(installment: &Installment, paid_by: Option<&Payment>) -> Result<(), BillingError> {
    match installment.status {
        InstallmentStatus::Pending | InstallmentStatus::Overdue => Ok(()),
        InstallmentStatus::Paid => match paid_by {
            Some(payment) => Err(BillingError::AlreadySettled {
                installment_id: installment.id,
                payment_id: payment.id,
            }),
            None => Err(BillingError::conflict(format!(
                "Installment {} is already paid",
                installment.id
            ))),
        },
        InstallmentStatus::Cancelled => Err(BillingError::validation(
            "installmentId",
            format!("Installment {} is cancelled", installment.id),
        )),
    }
}

fn intent_request(
    graph: &InvoiceGraph,
    installment: &Installment,
    method: PaymentMethod,
    payment_id: PaymentId,
) -> CreatePaymentIntentRequest {
    let invoice = &graph.invoice;
    let metadata = HashMap::from([
        ("installment_id".to_string(), installment.id.to_string()),
        ("invoice_id".to_string(), invoice.id.to_string()),
        ("invoice_number".to_string(), invoice.number.clone()),
        ("payment_id".to_string(), payment_id.to_string()),
    ]);
    CreatePaymentIntentRequest {
        amount: installment.amount,
        method,
        description: format!(
            "{} installment {}/{}",
            invoice.number,
            installment.number,
            graph.installments.len()
        ),
        metadata,
        idempotency_key: payment_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::application::handlers::billing::test_support::{generate, settle};
    use crate::domain::billing::PaymentStatus;
    use crate::ports::PaymentError;

    fn handler(store: &InMemoryBillingStore, gateway: &MockPaymentGateway) -> StartGatewayPaymentHandler {
        StartGatewayPaymentHandler::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            NumberingPolicy::default(),
        )
    }

    fn command(installment_id: InstallmentId) -> StartGatewayPaymentCommand {
        StartGatewayPaymentCommand {
            installment_id,
            method: PaymentMethod::CreditCard,
        }
    }

    #[tokio::test]
    async fn records_pending_attempt_with_intent_reference() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let graph = generate(&store, 7_500, 3, 1).await;
        let installment = &graph.installments[1].installment;

        let result = handler(&store, &gateway)
            .handle(command(installment.id))
            .await
            .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Pending);
        assert_eq!(result.payment.amount, installment.amount);
        assert!(result.client_secret.is_some());

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].idempotency_key, result.payment.id.to_string());
        assert_eq!(calls[0].metadata["invoice_number"], graph.invoice.number);
        assert_eq!(calls[0].description, format!("{} installment 2/3", graph.invoice.number));

        let stored = store.payments().await;
        assert_eq!(stored, vec![result.payment.clone()]);
        assert_eq!(
            stored[0].external_payment_ref.as_deref(),
            Some("pi_mock_000001")
        );
    }

    #[tokio::test]
    async fn settled_installment_is_rejected_before_gateway_call() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let graph = generate(&store, 1_000, 1, 1).await;
        let id = graph.installments[0].installment.id;
        let settled = settle(&store, id, None).await;

        let err = handler(&store, &gateway).handle(command(id)).await.unwrap_err();

        assert_eq!(
            err,
            BillingError::AlreadySettled {
                installment_id: id,
                payment_id: settled.payment.id,
            }
        );
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn offline_method_is_rejected() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let graph = generate(&store, 1_000, 1, 1).await;

        let err = handler(&store, &gateway)
            .handle(StartGatewayPaymentCommand {
                installment_id: graph.installments[0].installment.id,
                method: PaymentMethod::Cash,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "method"));
    }

    #[tokio::test]
    async fn gateway_failure_records_nothing() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        gateway.set_error(PaymentError::network("connection reset"));
        let graph = generate(&store, 1_000, 1, 1).await;

        let err = handler(&store, &gateway)
            .handle(command(graph.installments[0].installment.id))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Internal(_)));
        assert!(store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_installment_is_not_found() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let missing = InstallmentId::new();

        let err = handler(&store, &gateway).handle(command(missing)).await.unwrap_err();

        assert_eq!(err, BillingError::not_found("Installment", missing));
    }
}
