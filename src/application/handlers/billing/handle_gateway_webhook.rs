//! HandleGatewayWebhookHandler - Webhook reconciler.
//!
//! Verifies a gateway delivery and applies it in one transaction. Every
//! transition is checked against the state read inside that transaction,
//! so duplicate and out-of-order deliveries cannot regress a payment.
//!
//! Only authenticity failures surface as errors. Everything else is
//! acknowledged: redelivering the same event would not change the outcome,
//! and processing failures are left in the event log and the error log for
//! operators.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::billing::{BillingError, Payment, PaymentStatus};
use crate::domain::foundation::{InstallmentId, Timestamp};
use crate::domain::gateway::{
    ChargeObject, GatewayEvent, GatewayEventKind, PaymentIntentObject, WebhookVerifier,
};
use crate::ports::{
    BillingStore, BillingTransaction, SaveResult, WebhookEventRecord, WebhookOutcome,
};

use super::cancel_payment::{reverse_payment, Reversal, ReversalOutcome};
use super::numbering::NumberingPolicy;
use super::record_payment::{record_settlement, RecordPaymentCommand, SettlementOutcome};

/// Command to handle a gateway webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleGatewayWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Signature header, if the request carried one.
    pub signature: Option<String>,
}

/// Result of webhook processing. All variants are acknowledged with 200.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleGatewayWebhookResult {
    /// The event was applied (or deliberately ignored) and recorded.
    Processed {
        event_id: String,
        outcome: WebhookOutcome,
        /// Payments whose status changed.
        affected: usize,
    },
    /// A previous delivery of this event already completed.
    AlreadyProcessed { event_id: String },
    /// Processing failed and was rolled back. Recorded for operators.
    Failed { event_id: String, error: String },
    /// Authentic body that is not an event envelope.
    Undecodable { reason: String },
}

/// What a dispatch did, before it is recorded.
struct Dispatch {
    outcome: WebhookOutcome,
    reason: Option<String>,
    affected: usize,
}

impl Dispatch {
    fn applied(affected: usize) -> Self {
        Self {
            outcome: WebhookOutcome::Success,
            reason: None,
            affected,
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        Self {
            outcome: WebhookOutcome::Ignored,
            reason: Some(reason.into()),
            affected: 0,
        }
    }
}

/// Handler for gateway webhook deliveries.
pub struct HandleGatewayWebhookHandler {
    store: Arc<dyn BillingStore>,
    verifier: Arc<WebhookVerifier>,
    numbering: NumberingPolicy,
}

impl HandleGatewayWebhookHandler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        verifier: Arc<WebhookVerifier>,
        numbering: NumberingPolicy,
    ) -> Self {
        Self {
            store,
            verifier,
            numbering,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleGatewayWebhookCommand,
    ) -> Result<HandleGatewayWebhookResult, BillingError> {
        // 1. Verify signature and decode the envelope
        let Some(signature) = cmd.signature.as_deref() else {
            warn!("Webhook rejected: missing signature header");
            return Err(BillingError::InvalidSignature);
        };
        let event = match self.verifier.verify_and_parse(&cmd.payload, signature) {
            Ok(event) => event,
            Err(e) if e.is_authentication_failure() => {
                warn!(error = %e, "Webhook rejected: signature verification failed");
                return Err(BillingError::InvalidSignature);
            }
            Err(e) => {
                warn!(error = %e, "Authentic webhook payload could not be decoded");
                return Ok(HandleGatewayWebhookResult::Undecodable {
                    reason: e.to_string(),
                });
            }
        };

        let payload = serde_json::to_value(&event)
            .map_err(|e| BillingError::internal(format!("Failed to encode event: {}", e)))?;

        // 2. Apply and record in one transaction
        let mut tx = self.store.begin().await?;
        let applied = match self.apply(tx.as_mut(), &event, payload.clone()).await {
            Ok(Some(dispatch)) => tx
                .commit()
                .await
                .map(|()| Some(dispatch))
                .map_err(BillingError::from),
            Ok(None) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after duplicate webhook");
                }
                Ok(None)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after webhook error");
                }
                Err(err)
            }
        };

        match applied {
            Ok(Some(dispatch)) => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = dispatch.outcome.as_str(),
                    affected = dispatch.affected,
                    "Webhook processed"
                );
                Ok(HandleGatewayWebhookResult::Processed {
                    event_id: event.id,
                    outcome: dispatch.outcome,
                    affected: dispatch.affected,
                })
            }
            Ok(None) => {
                info!(event_id = %event.id, "Webhook already processed");
                Ok(HandleGatewayWebhookResult::AlreadyProcessed { event_id: event.id })
            }
            Err(err) => {
                // 3. Acknowledge, but leave a trail for operator follow-up
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "Webhook processing failed"
                );
                self.record_failure(&event, &err, payload).await;
                Ok(HandleGatewayWebhookResult::Failed {
                    event_id: event.id,
                    error: err.to_string(),
                })
            }
        }
    }

    async fn record_failure(
        &self,
        event: &GatewayEvent,
        err: &BillingError,
        payload: serde_json::Value,
    ) {
        let record =
            WebhookEventRecord::failed(&event.id, &event.event_type, err.to_string(), payload);
        let saved = async {
            let mut tx = self.store.begin().await?;
            tx.save_webhook_event(&record).await?;
            tx.commit().await
        };
        if let Err(e) = saved.await {
            error!(event_id = %event.id, error = %e, "Failed to record webhook failure");
        }
    }

    /// Returns `None` when another delivery already completed the event.
    async fn apply(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &GatewayEvent,
        payload: serde_json::Value,
    ) -> Result<Option<Dispatch>, BillingError> {
        if let Some(existing) = tx.find_webhook_event(&event.id).await? {
            if existing.is_final() {
                return Ok(None);
            }
        }

        let dispatch = self.dispatch(tx, event, Timestamp::now()).await?;

        let record = match dispatch.outcome {
            WebhookOutcome::Ignored => WebhookEventRecord::ignored(
                &event.id,
                &event.event_type,
                dispatch.reason.clone().unwrap_or_default(),
                payload,
            ),
            _ => WebhookEventRecord::success(&event.id, &event.event_type, payload),
        };
        match tx.save_webhook_event(&record).await? {
            SaveResult::Inserted => Ok(Some(dispatch)),
            SaveResult::AlreadyExists => Ok(None),
        }
    }

    async fn dispatch(
        &self,
        tx: &mut dyn BillingTransaction,
        event: &GatewayEvent,
        now: Timestamp,
    ) -> Result<Dispatch, BillingError> {
        let kind = match event.kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Event object could not be decoded");
                return Ok(Dispatch::ignored(e.to_string()));
            }
        };

        match kind {
            GatewayEventKind::PaymentSucceeded(intent) => {
                self.payment_succeeded(tx, &intent, now).await
            }
            GatewayEventKind::PaymentFailed(intent) => payment_failed(tx, &intent, now).await,
            GatewayEventKind::ChargeRefunded(charge) => charge_refunded(tx, &charge, now).await,
            GatewayEventKind::Unknown(event_type) => {
                info!(event_id = %event.id, event_type = %event_type, "Ignoring webhook event");
                Ok(Dispatch::ignored(format!("Unhandled event type {}", event_type)))
            }
        }
    }

    async fn payment_succeeded(
        &self,
        tx: &mut dyn BillingTransaction,
        intent: &PaymentIntentObject,
        now: Timestamp,
    ) -> Result<Dispatch, BillingError> {
        let payments = tx.find_payments_by_payment_ref(&intent.id).await?;
        if payments.is_empty() {
            warn!(payment_reference = %intent.id, "No payment matches succeeded intent");
            return Ok(Dispatch::ignored(format!("No payment for {}", intent.id)));
        }

        let mut affected = 0;
        for (installment_id, attempts) in by_installment(&payments) {
            let Some(attempt) = attempts.iter().find(|p| !p.status.is_reversed()) else {
                warn!(
                    payment_reference = %intent.id,
                    installment_id = %installment_id,
                    "Success for a reversed payment ignored"
                );
                continue;
            };

            let cmd = RecordPaymentCommand {
                installment_id,
                method: attempt.method,
                amount: attempt.amount,
                external_payment_ref: Some(intent.id.clone()),
                external_charge_ref: intent.latest_charge.clone(),
                note: None,
            };
            match record_settlement(tx, &cmd, &self.numbering, now).await {
                Ok(result) => {
                    if result.outcome != SettlementOutcome::Replayed {
                        affected += 1;
                    }
                }
                Err(e @ BillingError::AlreadySettled { .. })
                | Err(e @ BillingError::Validation { .. }) => {
                    warn!(
                        payment_reference = %intent.id,
                        installment_id = %installment_id,
                        error = %e,
                        "Succeeded intent not applied"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Dispatch::applied(affected))
    }
}

async fn payment_failed(
    tx: &mut dyn BillingTransaction,
    intent: &PaymentIntentObject,
    now: Timestamp,
) -> Result<Dispatch, BillingError> {
    let payments = tx.find_payments_by_payment_ref(&intent.id).await?;
    if payments.is_empty() {
        warn!(payment_reference = %intent.id, "No payment matches failed intent");
        return Ok(Dispatch::ignored(format!("No payment for {}", intent.id)));
    }

    let mut affected = 0;
    for candidate in payments {
        let Some(mut payment) = tx.lock_payment(candidate.id).await? else {
            continue;
        };
        // A failure never overrides a settled or reversed payment
        if !matches!(
            payment.status,
            PaymentStatus::Pending | PaymentStatus::Processing
        ) {
            warn!(
                payment_id = %payment.id,
                status = %payment.status,
                "Late payment failure ignored"
            );
            continue;
        }
        payment.mark_failed(intent.failure_reason(), now)?;
        tx.update_payment(&payment).await?;
        affected += 1;
    }
    Ok(Dispatch::applied(affected))
}

async fn charge_refunded(
    tx: &mut dyn BillingTransaction,
    charge: &ChargeObject,
    now: Timestamp,
) -> Result<Dispatch, BillingError> {
    if !charge.refunded {
        info!(
            charge = %charge.id,
            amount_refunded = charge.amount_refunded,
            "Partial refund acknowledged without state change"
        );
        return Ok(Dispatch::ignored("Partial refund"));
    }

    let mut payments = tx.find_payments_by_charge_ref(&charge.id).await?;
    if payments.is_empty() {
        if let Some(intent_id) = charge.payment_intent.as_deref() {
            payments = tx.find_payments_by_payment_ref(intent_id).await?;
        }
    }
    if payments.is_empty() {
        warn!(charge = %charge.id, "No payment matches refunded charge");
        return Ok(Dispatch::ignored(format!("No payment for {}", charge.id)));
    }

    let mut affected = 0;
    for payment in payments {
        let result = reverse_payment(tx, payment.id, Reversal::Refund, now).await?;
        if result.outcome != ReversalOutcome::AlreadyReversed {
            affected += 1;
        }
    }
    Ok(Dispatch::applied(affected))
}

/// Groups payments by installment, keeping first-seen order.
fn by_installment(payments: &[Payment]) -> Vec<(InstallmentId, Vec<&Payment>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<InstallmentId, Vec<&Payment>> = HashMap::new();
    for payment in payments {
        groups
            .entry(payment.installment_id)
            .or_insert_with(|| {
                order.push(payment.installment_id);
                Vec::new()
            })
            .push(payment);
    }
    order
        .into_iter()
        .filter_map(|id| groups.remove(&id).map(|group| (id, group)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FailPoint, InMemoryBillingStore};
    use crate::application::handlers::billing::test_support::{generate, pending_payment, settle};
    use crate::domain::billing::{InstallmentStatus, InvoiceStatus, TicketStatus};
    use crate::domain::gateway::sign_payload;
    use secrecy::Secret;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn handler(store: &InMemoryBillingStore) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(
            Arc::new(store.clone()),
            Arc::new(WebhookVerifier::new(Secret::new(SECRET.to_string()), 300)),
            NumberingPolicy::default(),
        )
    }

    fn signed(body: serde_json::Value) -> HandleGatewayWebhookCommand {
        let payload = serde_json::to_vec(&body).unwrap();
        let signature = sign_payload(SECRET, chrono::Utc::now().timestamp(), &payload);
        HandleGatewayWebhookCommand {
            payload,
            signature: Some(signature),
        }
    }

    fn event(id: &str, event_type: &str, object: serde_json::Value) -> serde_json::Value {
        json!({
            "id": id,
            "type": event_type,
            "created": 1_760_000_000,
            "data": { "object": object },
            "livemode": false
        })
    }

    fn succeeded(id: &str, intent: &str) -> HandleGatewayWebhookCommand {
        signed(event(
            id,
            "payment_intent.succeeded",
            json!({ "id": intent, "amount": 18000, "latest_charge": "ch_1" }),
        ))
    }

    fn refunded(id: &str, charge: &str, intent: &str, full: bool) -> HandleGatewayWebhookCommand {
        signed(event(
            id,
            "charge.refunded",
            json!({
                "id": charge,
                "payment_intent": intent,
                "refunded": full,
                "amount": 18000,
                "amount_refunded": if full { 18000 } else { 5000 }
            }),
        ))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Authenticity
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let store = InMemoryBillingStore::new();
        let mut cmd = succeeded("evt_1", "pi_abc");
        cmd.signature = None;

        let err = handler(&store).handle(cmd).await.unwrap_err();

        assert_eq!(err, BillingError::InvalidSignature);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected_without_state_change() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        pending_payment(&store, graph.installments[0].installment.id, "pi_abc").await;
        let mut cmd = succeeded("evt_1", "pi_abc");
        cmd.payload.extend_from_slice(b" ");

        let err = handler(&store).handle(cmd).await.unwrap_err();

        assert_eq!(err, BillingError::InvalidSignature);
        assert!(store.webhook_event("evt_1").await.is_none());
        assert!(store.payments().await.iter().all(|p| !p.is_paid()));
    }

    #[tokio::test]
    async fn authentic_garbage_is_acknowledged() {
        let store = InMemoryBillingStore::new();
        let payload = b"not json".to_vec();
        let signature = sign_payload(SECRET, chrono::Utc::now().timestamp(), &payload);

        let result = handler(&store)
            .handle(HandleGatewayWebhookCommand {
                payload,
                signature: Some(signature),
            })
            .await
            .unwrap();

        assert!(matches!(result, HandleGatewayWebhookResult::Undecodable { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Succeeded
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn success_promotes_pending_attempt() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        let pending = pending_payment(&store, graph.installments[0].installment.id, "pi_abc").await;

        let result = handler(&store).handle(succeeded("evt_1", "pi_abc")).await.unwrap();

        assert_eq!(
            result,
            HandleGatewayWebhookResult::Processed {
                event_id: "evt_1".to_string(),
                outcome: WebhookOutcome::Success,
                affected: 1,
            }
        );
        let stored = store.load_invoice_graph(graph.invoice.id).await.unwrap().unwrap();
        let payment = &stored.installments[0].payments[0];
        assert_eq!(payment.id, pending.id);
        assert!(payment.is_paid());
        assert_eq!(payment.external_charge_ref.as_deref(), Some("ch_1"));
        assert_eq!(stored.invoice.status, InvoiceStatus::Paid);
        assert!(stored.tickets.iter().all(|t| t.status == TicketStatus::Active));
        assert_eq!(
            store.webhook_event("evt_1").await.unwrap().outcome,
            WebhookOutcome::Success
        );
    }

    #[tokio::test]
    async fn redelivery_is_already_processed() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        pending_payment(&store, graph.installments[0].installment.id, "pi_abc").await;
        let h = handler(&store);

        h.handle(succeeded("evt_1", "pi_abc")).await.unwrap();
        let again = h.handle(succeeded("evt_1", "pi_abc")).await.unwrap();

        assert_eq!(
            again,
            HandleGatewayWebhookResult::AlreadyProcessed {
                event_id: "evt_1".to_string()
            }
        );
        assert_eq!(store.payments().await.len(), 1);
    }

    #[tokio::test]
    async fn new_event_for_settled_reference_is_replay() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        settle(&store, graph.installments[0].installment.id, Some("pi_abc")).await;

        let result = handler(&store).handle(succeeded("evt_2", "pi_abc")).await.unwrap();

        assert!(matches!(
            result,
            HandleGatewayWebhookResult::Processed { affected: 0, .. }
        ));
        assert_eq!(store.payments().await.len(), 1);
    }

    #[tokio::test]
    async fn unmatched_reference_is_ignored() {
        let store = InMemoryBillingStore::new();

        let result = handler(&store).handle(succeeded("evt_1", "pi_unknown")).await.unwrap();

        assert!(matches!(
            result,
            HandleGatewayWebhookResult::Processed {
                outcome: WebhookOutcome::Ignored,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn success_after_refund_is_ignored() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        let pending = pending_payment(&store, graph.installments[0].installment.id, "pi_abc").await;
        handler(&store)
            .handle(refunded("evt_r", "ch_1", "pi_abc", true))
            .await
            .unwrap();

        handler(&store).handle(succeeded("evt_s", "pi_abc")).await.unwrap();

        let payments = store.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].id, pending.id);
        assert_eq!(payments[0].status, PaymentStatus::Refunded);
        let stored = store.load_invoice_graph(graph.invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.installments[0].installment.status, InstallmentStatus::Pending);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Failed
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failure_marks_pending_attempt_failed() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        pending_payment(&store, graph.installments[0].installment.id, "pi_abc").await;

        handler(&store)
            .handle(signed(event(
                "evt_f",
                "payment_intent.payment_failed",
                json!({
                    "id": "pi_abc",
                    "last_payment_error": { "code": "card_declined", "message": "Your card was declined." }
                }),
            )))
            .await
            .unwrap();

        let payments = store.payments().await;
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        let stored = store.load_invoice_graph(graph.invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.installments[0].installment.status, InstallmentStatus::Pending);
    }

    #[tokio::test]
    async fn late_failure_does_not_touch_paid_payment() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        settle(&store, graph.installments[0].installment.id, Some("pi_abc")).await;

        let result = handler(&store)
            .handle(signed(event(
                "evt_f",
                "payment_intent.payment_failed",
                json!({ "id": "pi_abc" }),
            )))
            .await
            .unwrap();

        assert!(matches!(
            result,
            HandleGatewayWebhookResult::Processed { affected: 0, .. }
        ));
        assert!(store.payments().await[0].is_paid());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Charge Refunded
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn refund_matches_by_intent_and_rolls_back() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        settle(&store, graph.installments[0].installment.id, Some("pi_abc")).await;

        let result = handler(&store)
            .handle(refunded("evt_r", "ch_unknown", "pi_abc", true))
            .await
            .unwrap();

        assert!(matches!(
            result,
            HandleGatewayWebhookResult::Processed { affected: 1, .. }
        ));
        let stored = store.load_invoice_graph(graph.invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.installments[0].payments[0].status, PaymentStatus::Refunded);
        assert_eq!(stored.installments[0].installment.status, InstallmentStatus::Pending);
        assert_eq!(stored.invoice.status, InvoiceStatus::Pending);
        assert!(stored.tickets.iter().all(|t| t.status == TicketStatus::Pending));
    }

    #[tokio::test]
    async fn partial_refund_is_ignored() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        settle(&store, graph.installments[0].installment.id, Some("pi_abc")).await;

        let result = handler(&store)
            .handle(refunded("evt_r", "ch_1", "pi_abc", false))
            .await
            .unwrap();

        assert!(matches!(
            result,
            HandleGatewayWebhookResult::Processed {
                outcome: WebhookOutcome::Ignored,
                ..
            }
        ));
        assert!(store.payments().await[0].is_paid());
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let store = InMemoryBillingStore::new();

        let result = handler(&store)
            .handle(signed(event("evt_u", "customer.created", json!({ "id": "cus_1" }))))
            .await
            .unwrap();

        assert!(matches!(
            result,
            HandleGatewayWebhookResult::Processed {
                outcome: WebhookOutcome::Ignored,
                ..
            }
        ));
        assert_eq!(
            store.webhook_event("evt_u").await.unwrap().outcome,
            WebhookOutcome::Ignored
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Processing Failures
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn processing_failure_is_acknowledged_recorded_and_retryable() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        pending_payment(&store, graph.installments[0].installment.id, "pi_abc").await;
        store.fail_once(FailPoint::UpdateInvoiceStatus);
        let h = handler(&store);

        let first = h.handle(succeeded("evt_1", "pi_abc")).await.unwrap();

        assert!(matches!(first, HandleGatewayWebhookResult::Failed { .. }));
        assert_eq!(
            store.webhook_event("evt_1").await.unwrap().outcome,
            WebhookOutcome::Failed
        );
        assert!(store.payments().await.iter().all(|p| !p.is_paid()));

        let retry = h.handle(succeeded("evt_1", "pi_abc")).await.unwrap();

        assert!(matches!(
            retry,
            HandleGatewayWebhookResult::Processed { affected: 1, .. }
        ));
        assert!(store.payments().await[0].is_paid());
    }

    #[tokio::test]
    async fn commit_failure_is_recorded_as_failed() {
        let store = InMemoryBillingStore::new();
        let graph = generate(&store, 18_000, 1, 1).await;
        let installment_id = graph.installments[0].installment.id;
        pending_payment(&store, installment_id, "pi_abc").await;
        store.fail_once(FailPoint::Commit);
        let h = handler(&store);

        let first = h.handle(succeeded("evt_1", "pi_abc")).await.unwrap();

        assert!(matches!(
            first,
            HandleGatewayWebhookResult::Failed { ref event_id, .. } if event_id == "evt_1"
        ));
        assert_eq!(
            store.webhook_event("evt_1").await.unwrap().outcome,
            WebhookOutcome::Failed
        );
        assert_eq!(
            store.installment(installment_id).await.unwrap().status,
            InstallmentStatus::Pending
        );

        let retry = h.handle(succeeded("evt_1", "pi_abc")).await.unwrap();

        assert!(matches!(
            retry,
            HandleGatewayWebhookResult::Processed { affected: 1, .. }
        ));
        assert_eq!(
            store.webhook_event("evt_1").await.unwrap().outcome,
            WebhookOutcome::Success
        );
    }
}
