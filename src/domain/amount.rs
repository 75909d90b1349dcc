use crate::error::CheckoutError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-negative monetary amount in the operating currency.
///
/// Wraps `rust_decimal::Decimal` so that amounts entering the codec or a purchase
/// record have already been checked.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, CheckoutError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(CheckoutError::InvalidAmount(format!(
                "amount must not be negative, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Formats the amount with exactly two fraction digits, rounding half away from zero.
    pub fn to_wire(&self) -> String {
        let mut rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        // -0.00 would otherwise survive rescale
        rounded.set_sign_positive(true);
        rounded.to_string()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = CheckoutError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<f64> for Amount {
    type Error = CheckoutError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(CheckoutError::InvalidAmount(format!(
                "amount must be finite, got {value}"
            )));
        }
        let decimal = Decimal::try_from(value)
            .map_err(|e| CheckoutError::InvalidAmount(format!("{value}: {e}")))?;
        Self::new(decimal)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}
