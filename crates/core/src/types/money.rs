//! Monetary amounts using decimal arithmetic.
//!
//! The storefront settles in a single currency, so [`Money`] carries only the
//! amount; [`CurrencyCode`] exists for the gateway wire format and display.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ISO 4217 currency code used for settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    /// Bangladeshi taka.
    #[default]
    BDT,
}

impl CurrencyCode {
    /// The three-letter code sent to the payment gateway.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BDT => "BDT",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount of money in the store currency.
///
/// Serialized as a decimal string (`"5200.00"`) so no precision is lost in
/// JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole currency units, e.g. `Money::from_units(150)` is 150.00.
    #[must_use]
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// This amount multiplied by a line quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Amount rounded to two decimal places, as sent on the wire.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!("{:.2}", self.0.round_dp(2))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", CurrencyCode::default(), self.to_wire())
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

// SQLx support (with postgres feature): stored as NUMERIC
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times_and_sum() {
        let lines = [Money::from_units(100).times(2), Money::from_units(5000).times(1)];
        let total: Money = lines.into_iter().sum();
        assert_eq!(total, Money::from_units(5200));
    }

    #[test]
    fn test_wire_format_has_two_decimals() {
        assert_eq!(Money::from_units(150).to_wire(), "150.00");
        assert_eq!(Money::new(Decimal::new(19_995, 3)).to_wire(), "20.00");
    }

    #[test]
    fn test_display_includes_currency() {
        assert_eq!(Money::from_units(5200).to_string(), "BDT 5200.00");
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&Money::new(Decimal::new(12_550, 2))).unwrap();
        assert_eq!(json, "\"125.50\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::new(Decimal::new(12_550, 2)));
    }

    #[test]
    fn test_is_negative() {
        assert!(!Money::ZERO.is_negative());
        assert!((Money::ZERO - Money::from_units(1)).is_negative());
    }
}
