//! CancelPaymentHandler - Payment canceller.
//!
//! Reverses a settled payment and rolls its installment back to PENDING.
//! Staff cancellations go through [`CancelPaymentHandler`]; gateway refunds
//! reach [`reverse_payment`] from the webhook reconciler.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::billing::{BillingError, Installment, Invoice, Payment};
use crate::domain::foundation::{PaymentId, Timestamp};
use crate::ports::{BillingStore, BillingTransaction};

use super::recompute_invoice_status::recompute_invoice_status;
use super::transaction::finish;

/// Who is reversing the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reversal {
    /// Staff action. Ends in CANCELLED.
    Manual,
    /// Gateway refund. Ends in REFUNDED.
    Refund,
}

/// How the reversal was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalOutcome {
    /// A PAID payment was reversed and the installment reconsidered.
    Reversed,
    /// A payment that never settled was refunded. The installment is untouched.
    RefundedUnsettled,
    /// Refund replay for a payment already reversed. Nothing changed.
    AlreadyReversed,
}

/// Command to cancel a payment.
#[derive(Debug, Clone)]
pub struct CancelPaymentCommand {
    pub payment_id: PaymentId,
}

/// Result of a reversal.
#[derive(Debug, Clone)]
pub struct CancelPaymentResult {
    pub payment: Payment,
    pub installment: Installment,
    pub invoice: Invoice,
    pub outcome: ReversalOutcome,
}

/// Handler for staff payment cancellation.
pub struct CancelPaymentHandler {
    store: Arc<dyn BillingStore>,
}

impl CancelPaymentHandler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        cmd: CancelPaymentCommand,
    ) -> Result<CancelPaymentResult, BillingError> {
        let mut tx = self.store.begin().await?;
        let result =
            reverse_payment(tx.as_mut(), cmd.payment_id, Reversal::Manual, Timestamp::now()).await;
        let cancelled = finish(tx, result).await?;

        info!(
            payment_id = %cancelled.payment.id,
            installment_id = %cancelled.installment.id,
            installment_status = %cancelled.installment.status,
            invoice_id = %cancelled.invoice.id,
            invoice_status = %cancelled.invoice.status,
            "Payment cancelled"
        );

        Ok(cancelled)
    }
}

/// Reverses a payment inside the caller's transaction.
///
/// # Errors
///
/// - `NotFound` if the payment does not exist
/// - `AlreadyCancelled` on a manual cancel of a reversed payment
/// - `Conflict` on a manual cancel of a payment that never settled
pub(crate) async fn reverse_payment(
    tx: &mut dyn BillingTransaction,
    payment_id: PaymentId,
    reversal: Reversal,
    now: Timestamp,
) -> Result<CancelPaymentResult, BillingError> {
    let unlocked = tx
        .find_payment(payment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Payment", payment_id))?;
    let installment_id = unlocked.installment_id;
    let invoice_id = tx
        .find_invoice_id_for_installment(installment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Installment", installment_id))?;

    // Lock order: invoice, installment, payment
    let invoice = tx
        .lock_invoice(invoice_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))?;
    let mut installment = tx
        .lock_installment(installment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Installment", installment_id))?;
    let mut payment = tx
        .lock_payment(payment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Payment", payment_id))?;

    if payment.status.is_reversed() {
        return match reversal {
            Reversal::Manual => Err(BillingError::AlreadyCancelled {
                payment_id,
                status: payment.status,
            }),
            Reversal::Refund => Ok(CancelPaymentResult {
                payment,
                installment,
                invoice,
                outcome: ReversalOutcome::AlreadyReversed,
            }),
        };
    }

    if !payment.is_paid() {
        if reversal == Reversal::Manual {
            return Err(BillingError::conflict(format!(
                "Only PAID payments can be cancelled; payment {} is {}",
                payment_id, payment.status
            )));
        }
        // Refund raced ahead of the success event
        payment.refund(now)?;
        tx.update_payment(&payment).await?;
        warn!(
            payment_id = %payment_id,
            installment_id = %installment_id,
            "Refund received for a payment that never settled"
        );
        return Ok(CancelPaymentResult {
            payment,
            installment,
            invoice,
            outcome: ReversalOutcome::RefundedUnsettled,
        });
    }

    match reversal {
        Reversal::Manual => payment.cancel(now)?,
        Reversal::Refund => payment.refund(now)?,
    }
    tx.update_payment(&payment).await?;

    let other_paid = tx
        .list_payments(installment_id)
        .await?
        .iter()
        .any(|p| p.id != payment_id && p.is_paid());
    if installment.is_paid() && !other_paid {
        installment.reopen(now)?;
        tx.update_installment(&installment).await?;
    }

    let recomputed = recompute_invoice_status(tx, invoice_id, now).await?;

    Ok(CancelPaymentResult {
        payment,
        installment,
        invoice: recomputed.invoice,
        outcome: ReversalOutcome::Reversed,
    })
}
