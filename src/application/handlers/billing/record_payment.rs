//! RecordPaymentHandler - Installment ledger.
//!
//! Records the settlement of an installment. Replays carrying an external
//! payment reference that already settled the installment return the
//! existing payment instead of writing a second one.
//!
//! # Locking
//!
//! The invoice row is locked before the installment row, the same order the
//! canceller uses, so concurrent settlements of one installment serialize
//! and only one of them observes it unpaid.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::billing::{
    payment_number, BillingError, Installment, InstallmentStatus, Invoice, NewPayment,
    NumberScope, Payment, PaymentMethod,
};
use crate::domain::foundation::{InstallmentId, Money, Timestamp};
use crate::ports::{BillingStore, BillingTransaction};

use super::numbering::{allocate_number, NumberingPolicy};
use super::recompute_invoice_status::recompute_invoice_status;
use super::transaction::finish;

/// Command to record a settled payment against an installment.
#[derive(Debug, Clone)]
pub struct RecordPaymentCommand {
    pub installment_id: InstallmentId,
    pub method: PaymentMethod,
    pub amount: Money,
    /// Gateway payment reference, or a staff-entered transaction id.
    pub external_payment_ref: Option<String>,
    pub external_charge_ref: Option<String>,
    pub note: Option<String>,
}

/// How the settlement was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// A new PAID payment was written.
    Recorded,
    /// An open payment with the same reference became PAID.
    Promoted,
    /// The reference had already settled this installment. Nothing changed.
    Replayed,
}

/// Result of recording a payment.
#[derive(Debug, Clone)]
pub struct RecordPaymentResult {
    pub payment: Payment,
    pub installment: Installment,
    pub invoice: Invoice,
    pub outcome: SettlementOutcome,
}

/// Handler for manual payment registration.
pub struct RecordPaymentHandler {
    store: Arc<dyn BillingStore>,
    numbering: NumberingPolicy,
}

impl RecordPaymentHandler {
    pub fn new(store: Arc<dyn BillingStore>, numbering: NumberingPolicy) -> Self {
        Self { store, numbering }
    }

    pub async fn handle(
        &self,
        cmd: RecordPaymentCommand,
    ) -> Result<RecordPaymentResult, BillingError> {
        let cmd = normalize(cmd)?;

        let mut tx = self.store.begin().await?;
        let result = record_settlement(tx.as_mut(), &cmd, &self.numbering, Timestamp::now()).await;
        let recorded = finish(tx, result).await?;

        if recorded.outcome != SettlementOutcome::Replayed {
            info!(
                payment_id = %recorded.payment.id,
                payment_number = %recorded.payment.number,
                installment_id = %recorded.installment.id,
                invoice_id = %recorded.invoice.id,
                invoice_status = %recorded.invoice.status,
                outcome = ?recorded.outcome,
                "Payment recorded"
            );
        }

        Ok(recorded)
    }
}

fn normalize(mut cmd: RecordPaymentCommand) -> Result<RecordPaymentCommand, BillingError> {
    if !cmd.amount.is_positive() {
        return Err(BillingError::validation("amount", "must be greater than zero"));
    }
    cmd.external_payment_ref = non_blank(cmd.external_payment_ref);
    cmd.external_charge_ref = non_blank(cmd.external_charge_ref);
    cmd.note = non_blank(cmd.note);
    Ok(cmd)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Settles an installment inside the caller's transaction.
///
/// Also used by the webhook reconciler, which passes the gateway intent id
/// as the payment reference.
pub(crate) async fn record_settlement(
    tx: &mut dyn BillingTransaction,
    cmd: &RecordPaymentCommand,
    numbering: &NumberingPolicy,
    now: Timestamp,
) -> Result<RecordPaymentResult, BillingError> {
    let installment_id = cmd.installment_id;
    let invoice_id = tx
        .find_invoice_id_for_installment(installment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Installment", installment_id))?;

    // 1. Lock invoice, then installment
    let invoice = tx
        .lock_invoice(invoice_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))?;
    let mut installment = tx
        .lock_installment(installment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Installment", installment_id))?;

    if installment.status == InstallmentStatus::Cancelled {
        return Err(BillingError::validation(
            "installmentId",
            format!("Installment {} is cancelled", installment_id),
        ));
    }

    // 2. Same reference seen before on this installment?
    let payments = tx.list_payments(installment_id).await?;
    let mut promotable = None;
    if let Some(reference) = cmd.external_payment_ref.as_deref() {
        let matching = payments.iter().filter(|p| p.has_payment_ref(reference));
        for payment in matching {
            if payment.is_paid() {
                return Ok(RecordPaymentResult {
                    payment: payment.clone(),
                    installment,
                    invoice,
                    outcome: SettlementOutcome::Replayed,
                });
            }
            if payment.status.is_open() && promotable.is_none() {
                promotable = Some(payment.clone());
            }
        }
    }

    // 3. At most one PAID payment per installment
    if installment.is_paid() {
        let settled_by = payments.iter().find(|p| p.is_paid()).ok_or_else(|| {
            BillingError::internal(format!(
                "Installment {} is PAID without a PAID payment",
                installment_id
            ))
        })?;
        return Err(BillingError::AlreadySettled {
            installment_id,
            payment_id: settled_by.id,
        });
    }

    if cmd.amount != installment.amount {
        warn!(
            installment_id = %installment_id,
            expected = %installment.amount,
            received = %cmd.amount,
            "Payment amount differs from installment amount"
        );
    }

    // 4. Promote the open attempt, or write a new PAID payment
    let (payment, outcome) = match promotable {
        Some(mut payment) => {
            payment.mark_paid(cmd.external_charge_ref.clone(), now)?;
            tx.update_payment(&payment).await?;
            (payment, SettlementOutcome::Promoted)
        }
        None => {
            let year = now.year();
            let number = allocate_number(tx, NumberScope::Payment { year }, numbering, |seq| {
                payment_number(year, seq)
            })
            .await?;
            let payment = Payment::paid(
                NewPayment {
                    number,
                    installment_id,
                    amount: cmd.amount,
                    method: cmd.method,
                    external_payment_ref: cmd.external_payment_ref.clone(),
                    external_charge_ref: cmd.external_charge_ref.clone(),
                    note: cmd.note.clone(),
                },
                now,
            );
            tx.insert_payment(&payment).await?;
            (payment, SettlementOutcome::Recorded)
        }
    };

    installment.mark_paid(now)?;
    tx.update_installment(&installment).await?;

    // 5. Invoice status and tickets follow
    let recomputed = recompute_invoice_status(tx, invoice_id, now).await?;

    Ok(RecordPaymentResult {
        payment,
        installment,
        invoice: recomputed.invoice,
        outcome,
    })
}
