//! Billing engine tuning

use serde::Deserialize;

use super::error::ValidationError;

/// Billing engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Attempts made to allocate a free invoice/ticket number before giving up
    #[serde(default = "default_numbering_max_attempts")]
    pub numbering_max_attempts: u32,

    /// Prefix of human-readable invoice numbers
    #[serde(default = "default_invoice_number_prefix")]
    pub invoice_number_prefix: String,
}

impl BillingConfig {
    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.numbering_max_attempts == 0 || self.numbering_max_attempts > 20 {
            return Err(ValidationError::InvalidNumberingAttempts);
        }
        let prefix_ok = !self.invoice_number_prefix.is_empty()
            && self.invoice_number_prefix.len() <= 8
            && self
                .invoice_number_prefix
                .chars()
                .all(|c| c.is_ascii_uppercase());
        if !prefix_ok {
            return Err(ValidationError::InvalidInvoicePrefix);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            numbering_max_attempts: default_numbering_max_attempts(),
            invoice_number_prefix: default_invoice_number_prefix(),
        }
    }
}

fn default_numbering_max_attempts() -> u32 {
    5
}

fn default_invoice_number_prefix() -> String {
    "INV".to_string()
}
