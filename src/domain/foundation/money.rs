//! Fixed-point currency amounts.
//!
//! All amounts carry exactly two decimal places. Arithmetic happens on the
//! integer number of cents so splitting never drifts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// A non-negative amount in the single settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const SCALE: u32 = 2;

    /// Zero amount.
    pub fn zero() -> Self {
        Self(Decimal::new(0, Self::SCALE))
    }

    /// Builds an amount from a decimal with at most two fractional digits.
    pub fn new(amount: Decimal) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::invalid_format(
                "amount",
                "must not be negative",
            ));
        }
        let normalized = amount.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("at most {} decimal places allowed, got {}", Self::SCALE, amount),
            ));
        }
        let mut value = normalized;
        value.rescale(Self::SCALE);
        Ok(Self(value))
    }

    /// Builds an amount from an integer number of cents.
    pub fn from_cents(cents: i64) -> Result<Self, ValidationError> {
        if cents < 0 {
            return Err(ValidationError::invalid_format(
                "amount",
                "must not be negative",
            ));
        }
        Ok(Self(Decimal::new(cents, Self::SCALE)))
    }

    /// Integer number of cents.
    pub fn cents(&self) -> i128 {
        self.0.mantissa()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Splits the amount into `parts` shares.
    ///
    /// Every share is `self / parts` truncated to the cent; the remainder
    /// lands on the last share, so the shares always sum to `self`.
    pub fn split(&self, parts: u32) -> Result<Vec<Money>, ValidationError> {
        if parts == 0 {
            return Err(ValidationError::out_of_range("parts", 1, i64::from(u32::MAX), 0));
        }
        let total = self.cents();
        let count = i128::from(parts);
        let share = total / count;
        let last = total - share * (count - 1);

        let mut shares = Vec::with_capacity(parts as usize);
        for _ in 1..parts {
            shares.push(Self::from_cents_i128(share));
        }
        shares.push(Self::from_cents_i128(last));
        Ok(shares)
    }

    /// Sum of several amounts.
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Money>) -> Money {
        let cents: i128 = amounts.into_iter().map(Money::cents).sum();
        Self::from_cents_i128(cents)
    }

    fn from_cents_i128(cents: i128) -> Self {
        // Mantissa fits: inputs are bounded by the original decimal.
        Self(Decimal::from_i128_with_scale(cents, Self::SCALE))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap()).unwrap()
    }

    #[test]
    fn new_normalizes_to_two_places() {
        assert_eq!(money("180").to_string(), "180.00");
        assert_eq!(money("75.5").to_string(), "75.50");
        assert_eq!(money("10.000").to_string(), "10.00");
    }

    #[test]
    fn new_rejects_sub_cent_precision() {
        let err = Money::new(Decimal::from_str("10.001").unwrap()).unwrap_err();
        assert_eq!(err.field(), "amount");
    }

    #[test]
    fn new_rejects_negative() {
        assert!(Money::new(Decimal::from_str("-1.00").unwrap()).is_err());
        assert!(Money::from_cents(-5).is_err());
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(!Money::zero().is_positive());
        assert!(money("0.01").is_positive());
    }

    #[test]
    fn split_evenly() {
        let shares = money("75.00").split(3).unwrap();
        assert_eq!(shares, vec![money("25.00"), money("25.00"), money("25.00")]);
    }

    #[test]
    fn split_puts_remainder_on_last_share() {
        let shares = money("100.00").split(3).unwrap();
        assert_eq!(shares, vec![money("33.33"), money("33.33"), money("33.34")]);
    }

    #[test]
    fn split_single_part_is_identity() {
        assert_eq!(money("180.00").split(1).unwrap(), vec![money("180.00")]);
    }

    #[test]
    fn split_rejects_zero_parts() {
        assert!(money("10.00").split(0).is_err());
    }

    #[test]
    fn serde_uses_decimal_string() {
        let json = serde_json::to_string(&money("25")).unwrap();
        assert_eq!(json, "\"25.00\"");
        let back: Money = serde_json::from_str("\"25.00\"").unwrap();
        assert_eq!(back, money("25.00"));
    }

    #[test]
    fn serde_rejects_sub_cent_input() {
        assert!(serde_json::from_str::<Money>("\"1.234\"").is_err());
    }

    proptest! {
        #[test]
        fn split_shares_always_sum_to_total(cents in 0i64..10_000_000_000, parts in 1u32..=48) {
            let total = Money::from_cents(cents).unwrap();
            let shares = total.split(parts).unwrap();

            prop_assert_eq!(shares.len(), parts as usize);
            prop_assert_eq!(Money::sum(&shares), total);

            let first = shares[0];
            for share in &shares[..shares.len() - 1] {
                prop_assert_eq!(*share, first);
            }
            prop_assert!(shares[shares.len() - 1] >= first);
        }
    }
}
