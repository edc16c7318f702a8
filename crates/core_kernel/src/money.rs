//! Money types with precise decimal arithmetic
//!
//! Invoice amounts are carried as `rust_decimal::Decimal` so covered and
//! not-covered splits add back up to the invoiced total exactly. Equality
//! between independently computed totals uses [`AMOUNT_TOLERANCE`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest difference at which two amounts are considered equal
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/// Largest single amount accepted from callers
///
/// Sums of any realistic number of bounded amounts stay far inside the
/// `Decimal` range.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

/// Returns true when two amounts differ by no more than [`AMOUNT_TOLERANCE`]
///
/// Amounts whose difference is not representable never match.
pub fn amounts_match(a: Decimal, b: Decimal) -> bool {
    a.checked_sub(b)
        .is_some_and(|diff| diff.abs() <= AMOUNT_TOLERANCE)
}

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    CHF,
    EUR,
    USD,
    GBP,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::CHF => "CHF",
            Currency::EUR => "EUR",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHF" => Ok(Currency::CHF),
            "EUR" => Ok(Currency::EUR),
            "USD" => Ok(Currency::USD),
            "GBP" => Ok(Currency::GBP),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Amount overflow")]
    Overflow,
}

/// A monetary amount with associated currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value rounded to the currency's minor unit
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(currency.decimal_places()),
            currency,
        }
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Sums a sequence of raw amounts into one currency
    pub fn checked_sum<I>(amounts: I, currency: Currency) -> Result<Self, MoneyError>
    where
        I: IntoIterator<Item = Decimal>,
    {
        let total = amounts
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(total, currency))
    }

    /// Sums a sequence of raw amounts, clamping at the `Decimal` bounds
    pub fn saturating_sum<I>(amounts: I, currency: Currency) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let total = amounts
            .into_iter()
            .fold(Decimal::ZERO, |acc, amount| acc.saturating_add(amount));
        Self::new(total, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Compares two amounts within [`AMOUNT_TOLERANCE`]
    pub fn approx_eq(&self, other: &Money) -> bool {
        self.currency == other.currency && amounts_match(self.amount, other.amount)
    }

    /// Checked addition that returns an error on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self.amount.checked_add(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch or overflow
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self.amount.checked_sub(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Share of `self` in `total` as a percentage, zero when total is zero
    pub fn percent_of(&self, total: &Money) -> Decimal {
        if total.amount.is_zero() {
            return Decimal::ZERO;
        }
        self.amount
            .checked_div(total.amount)
            .and_then(|share| share.checked_mul(dec!(100)))
            .map_or(Decimal::ZERO, |percent| percent.round_dp(2))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency.code(), self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_rounds_to_minor_unit() {
        let m = Money::new(dec!(100.505), Currency::CHF);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.to_string(), "CHF 100.50");
    }

    #[test]
    fn test_currency_mismatch() {
        let chf = Money::new(dec!(100.00), Currency::CHF);
        let eur = Money::new(dec!(100.00), Currency::EUR);

        let result = chf.checked_add(&eur);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_amounts_match_tolerance() {
        assert!(amounts_match(dec!(10.00), dec!(10.01)));
        assert!(!amounts_match(dec!(10.00), dec!(10.02)));
    }

    #[test]
    fn test_amounts_match_out_of_range_difference() {
        assert!(!amounts_match(Decimal::MAX, Decimal::MIN));
        assert!(amounts_match(Decimal::MAX, Decimal::MAX));
    }

    #[test]
    fn test_sums_near_decimal_bounds() {
        let half = Decimal::MAX / dec!(2) + Decimal::ONE;
        assert_eq!(
            Money::checked_sum([half, half], Currency::CHF),
            Err(MoneyError::Overflow)
        );
        assert_eq!(
            Money::saturating_sum([half, half], Currency::CHF).amount(),
            Decimal::MAX
        );
        let big = Money::new(Decimal::MAX, Currency::CHF);
        assert_eq!(big.checked_add(&big), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_percent_of_zero_total() {
        let part = Money::new(dec!(5), Currency::CHF);
        assert_eq!(part.percent_of(&Money::zero(Currency::CHF)), Decimal::ZERO);
        let total = Money::new(dec!(20), Currency::CHF);
        assert_eq!(part.percent_of(&total), dec!(25.00));
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("chf".parse::<Currency>().unwrap(), Currency::CHF);
        assert!("XYZ".parse::<Currency>().is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn split_amounts_sum_back_to_total(
            total_minor in 0i64..10_000_000i64,
            covered_minor in 0i64..10_000_000i64,
        ) {
            let total = Decimal::new(total_minor, 2);
            let covered = Decimal::new(covered_minor.min(total_minor), 2);
            let not_covered = total - covered;
            prop_assert!(amounts_match(covered + not_covered, total));
        }
    }
}
