//! Transaction completion shared by every mutating handler.

use tracing::warn;

use crate::domain::billing::BillingError;
use crate::ports::BillingTransaction;

/// Commits on success; rolls back and returns the original error otherwise.
pub(crate) async fn finish<T>(
    tx: Box<dyn BillingTransaction>,
    result: Result<T, BillingError>,
) -> Result<T, BillingError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed after {}", err.code());
            }
            Err(err)
        }
    }
}
