//! Money type with decimal precision and currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Amounts are `rust_decimal::Decimal` and every posted amount must fit the
//! currency's minor unit (two decimals for rupiah, none for yen), so that
//! debit/credit totals compare with exact equality.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A monetary amount tagged with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount in major units (e.g. `100000.00` rupiah).
    pub amount: Decimal,
    /// ISO 4217 currency.
    pub currency: Currency,
}

impl Money {
    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Returns the amount expressed as an integer count of minor units,
    /// or `None` if it carries more precision than the currency allows.
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i128> {
        if !self.currency.fits_minor_units(self.amount) {
            return None;
        }
        let mut scaled = self.amount;
        scaled.rescale(self.currency.minor_units());
        Some(scaled.mantissa())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut amount = self.amount;
        amount.rescale(self.currency.minor_units());
        write!(f, "{} {amount}", self.currency)
    }
}

/// ISO 4217 currency codes supported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Indonesian Rupiah
    #[default]
    Idr,
    /// US Dollar
    Usd,
    /// Euro
    Eur,
    /// Singapore Dollar
    Sgd,
    /// Japanese Yen
    Jpy,
}

impl Currency {
    /// Number of decimal places in the currency's minor unit.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Self::Jpy => 0,
            Self::Idr | Self::Usd | Self::Eur | Self::Sgd => 2,
        }
    }

    /// Returns true if `amount` has no precision beyond the minor unit.
    ///
    /// Trailing zeros do not count: `100.500` fits a two-decimal currency.
    #[must_use]
    pub fn fits_minor_units(self, amount: Decimal) -> bool {
        amount.normalize().scale() <= self.minor_units()
    }

    /// The ISO 4217 code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Idr => "IDR",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Sgd => "SGD",
            Self::Jpy => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when parsing an unsupported currency code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IDR" => Ok(Self::Idr),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "SGD" => Ok(Self::Sgd),
            "JPY" => Ok(Self::Jpy),
            _ => Err(UnknownCurrency(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_zero() {
        let money = Money::zero(Currency::Idr);
        assert!(money.is_zero());
        assert!(!money.is_negative());
    }

    #[test]
    fn test_negative_zero_is_not_negative() {
        let money = Money::new(-dec!(0.00), Currency::Idr);
        assert!(!money.is_negative());
        assert!(Money::new(dec!(-0.01), Currency::Idr).is_negative());
    }

    #[rstest]
    #[case(Currency::Idr, dec!(100000), true)]
    #[case(Currency::Idr, dec!(100000.25), true)]
    #[case(Currency::Idr, dec!(100.500), true)]
    #[case(Currency::Idr, dec!(0.001), false)]
    #[case(Currency::Jpy, dec!(1500), true)]
    #[case(Currency::Jpy, dec!(1500.5), false)]
    fn test_fits_minor_units(#[case] currency: Currency, #[case] amount: Decimal, #[case] fits: bool) {
        assert_eq!(currency.fits_minor_units(amount), fits);
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(
            Money::new(dec!(100000), Currency::Idr).to_minor_units(),
            Some(10_000_000)
        );
        assert_eq!(Money::new(dec!(12.5), Currency::Usd).to_minor_units(), Some(1250));
        assert_eq!(Money::new(dec!(1.005), Currency::Usd).to_minor_units(), None);
    }

    #[test]
    fn test_display_uses_minor_unit_scale() {
        assert_eq!(Money::new(dec!(100000), Currency::Idr).to_string(), "IDR 100000.00");
        assert_eq!(Money::new(dec!(250), Currency::Jpy).to_string(), "JPY 250");
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("idr".parse::<Currency>().unwrap(), Currency::Idr);
        assert_eq!("JPY".parse::<Currency>().unwrap(), Currency::Jpy);
        assert_eq!(
            "XYZ".parse::<Currency>().unwrap_err(),
            UnknownCurrency("XYZ".to_string())
        );
    }
}
