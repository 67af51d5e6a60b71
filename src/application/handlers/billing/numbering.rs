//! Number allocation shared by the generator and the ledger.

use tracing::warn;

use crate::config::BillingConfig;
use crate::domain::billing::{BillingError, NumberScope};
use crate::ports::BillingTransaction;

/// How human-readable numbers are allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingPolicy {
    /// Fresh numbers tried before giving up with `Conflict`.
    pub max_attempts: u32,
    pub invoice_prefix: String,
}

impl Default for NumberingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            invoice_prefix: "INV".to_string(),
        }
    }
}

impl From<&BillingConfig> for NumberingPolicy {
    fn from(config: &BillingConfig) -> Self {
        Self {
            max_attempts: config.numbering_max_attempts,
            invoice_prefix: config.invoice_number_prefix.clone(),
        }
    }
}

/// Draws numbers from the scope's counter until one is free.
///
/// A taken number means the counter fell behind rows written elsewhere
/// (imports, manual fixes). Each retry draws the next value inside the same
/// transaction.
pub(crate) async fn allocate_number(
    tx: &mut dyn BillingTransaction,
    scope: NumberScope,
    policy: &NumberingPolicy,
    format: impl Fn(i64) -> String + Send,
) -> Result<String, BillingError> {
    for attempt in 1..=policy.max_attempts {
        let seq = tx.next_sequence(scope).await?;
        let number = format(seq);
        if !tx.number_taken(scope, &number).await? {
            return Ok(number);
        }
        warn!(
            scope = %scope.key(),
            number = %number,
            attempt,
            "Number already taken, drawing the next one"
        );
    }
    Err(BillingError::conflict(format!(
        "No free number in scope {} after {} attempts",
        scope.key(),
        policy.max_attempts
    )))
}
