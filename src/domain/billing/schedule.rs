//! Invoice request validation and installment/ticket planning.
//!
//! Pure functions: nothing here touches storage or allocates numbers.

use crate::domain::foundation::{
    EventId, InstallmentId, InvoiceId, Money, PersonId, Timestamp, UserId, ValidationError,
};

use super::{Installment, InstallmentStatus};

/// Upper bound on installments per invoice.
pub const MAX_INSTALLMENTS: u32 = 48;

/// Upper bound on tickets per invoice.
pub const MAX_TICKETS: u32 = 500;

/// A validated request to bill a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub person_id: PersonId,
    pub event_id: EventId,
    pub total_amount: Money,
    pub installments: u32,
    pub ticket_quantity: u32,
    pub ticket_type: String,
    pub created_by: UserId,
}

impl InvoiceRequest {
    /// Checks amounts and counts.
    ///
    /// The total must be positive and large enough to give every
    /// installment at least one cent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.total_amount.is_positive() {
            return Err(ValidationError::invalid_format(
                "amount",
                "must be greater than zero",
            ));
        }
        check_count("installments", self.installments, MAX_INSTALLMENTS)?;
        check_count("ticketQuantity", self.ticket_quantity, MAX_TICKETS)?;
        if self.total_amount.cents() < i128::from(self.installments) {
            return Err(ValidationError::invalid_format(
                "amount",
                format!(
                    "{} cannot be split into {} installments",
                    self.total_amount, self.installments
                ),
            ));
        }
        if self.ticket_type.trim().is_empty() {
            return Err(ValidationError::empty_field("ticketType"));
        }
        Ok(())
    }
}

fn check_count(field: &str, value: u32, max: u32) -> Result<(), ValidationError> {
    if value == 0 || value > max {
        return Err(ValidationError::out_of_range(
            field,
            1,
            i64::from(max),
            i64::from(value),
        ));
    }
    Ok(())
}

/// Builds the installment schedule for a new invoice.
///
/// Amounts follow [`Money::split`]. The first installment is due at
/// `start`, each following one a calendar month later.
pub fn installment_schedule(
    invoice_id: InvoiceId,
    total: Money,
    count: u32,
    start: Timestamp,
) -> Result<Vec<Installment>, ValidationError> {
    let amounts = total.split(count)?;
    Ok(amounts
        .into_iter()
        .enumerate()
        .map(|(index, amount)| {
            let offset = index as u32;
            Installment {
                id: InstallmentId::new(),
                invoice_id,
                number: offset + 1,
                amount,
                due_at: start.add_months(offset),
                status: InstallmentStatus::Pending,
                paid_at: None,
                created_at: start,
                updated_at: start,
            }
        })
        .collect())
}

/// Per-ticket prices: the total split across the tickets the same way
/// installments are split.
pub fn ticket_prices(total: Money, quantity: u32) -> Result<Vec<Money>, ValidationError> {
    total.split(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use proptest::prelude::*;

    fn request(cents: i64, installments: u32, tickets: u32) -> InvoiceRequest {
        InvoiceRequest {
            person_id: PersonId::new(),
            event_id: EventId::new(),
            total_amount: Money::from_cents(cents).unwrap(),
            installments,
            ticket_quantity: tickets,
            ticket_type: "STANDARD".to_string(),
            created_by: UserId::new("staff-1").unwrap(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request(7_500, 3, 1).validate().is_ok());
    }

    #[test]
    fn zero_amount_rejected() {
        let err = request(0, 1, 1).validate().unwrap_err();
        assert_eq!(err.field(), "amount");
    }

    #[test]
    fn zero_counts_rejected() {
        assert_eq!(request(100, 0, 1).validate().unwrap_err().field(), "installments");
        assert_eq!(request(100, 1, 0).validate().unwrap_err().field(), "ticketQuantity");
    }

    #[test]
    fn too_many_installments_rejected() {
        let err = request(1_000_000, MAX_INSTALLMENTS + 1, 1).validate().unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn amount_smaller_than_installment_count_rejected() {
        assert!(request(2, 3, 1).validate().is_err());
        assert!(request(3, 3, 1).validate().is_ok());
    }

    #[test]
    fn blank_ticket_type_rejected() {
        let mut req = request(100, 1, 1);
        req.ticket_type = "  ".to_string();
        assert_eq!(req.validate().unwrap_err().field(), "ticketType");
    }

    #[test]
    fn schedule_is_monthly_and_numbered() {
        let start = Timestamp::from_unix_secs(1_768_435_200).unwrap(); // 2026-01-15
        let schedule =
            installment_schedule(InvoiceId::new(), Money::from_cents(7_500).unwrap(), 3, start)
                .unwrap();

        let numbers: Vec<u32> = schedule.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(schedule[0].due_at, start);
        let months: Vec<u32> = schedule.iter().map(|i| i.due_at.as_datetime().month()).collect();
        assert_eq!(months, vec![1, 2, 3]);
        assert!(schedule
            .iter()
            .all(|i| i.status == InstallmentStatus::Pending && i.paid_at.is_none()));
        assert!(schedule
            .iter()
            .all(|i| i.amount == Money::from_cents(2_500).unwrap()));
    }

    #[test]
    fn ticket_prices_sum_to_total() {
        let prices = ticket_prices(Money::from_cents(10_000).unwrap(), 3).unwrap();
        assert_eq!(Money::sum(&prices), Money::from_cents(10_000).unwrap());
    }

    proptest! {
        #[test]
        fn schedule_sums_to_total(cents in 1i64..1_000_000_000, count in 1u32..=MAX_INSTALLMENTS) {
            prop_assume!(i128::from(cents) >= i128::from(count));
            let total = Money::from_cents(cents).unwrap();
            let schedule = installment_schedule(InvoiceId::new(), total, count, Timestamp::now()).unwrap();

            prop_assert_eq!(schedule.len(), count as usize);
            prop_assert_eq!(Money::sum(schedule.iter().map(|i| &i.amount)), total);
            prop_assert!(schedule.iter().all(|i| i.amount.is_positive()));
        }
    }
}
