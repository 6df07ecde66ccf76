//! Customer-facing order numbers.
//!
//! An order number is the creation date (`YYYYMMDD`) followed by the order's
//! database sequence id, e.g. `2026101642`. It doubles as the payment
//! gateway's transaction id. Because the date prefix is fixed-width and the
//! sequence id is unique, the number is unique.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::id::OrderId;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_LEN: usize = 8;
const MAX_LEN: usize = 32;

/// Errors parsing an [`OrderNumber`] received from outside.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("order number must be {DATE_LEN} date digits followed by a sequence")]
    Malformed,
    #[error("order number has an invalid date prefix")]
    InvalidDate,
}

/// A validated order number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Build the number for an order created on `date` with sequence `id`.
    #[must_use]
    pub fn from_parts(date: NaiveDate, id: OrderId) -> Self {
        Self(format!("{}{}", date.format(DATE_FORMAT), id.as_i64()))
    }

    /// Parse an order number from a request or gateway callback.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError`] if the value is not all digits, is too
    /// short or long, or does not start with a real calendar date.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let s = s.trim();
        if s.len() <= DATE_LEN || s.len() > MAX_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::Malformed);
        }
        let prefix = s.get(..DATE_LEN).ok_or(OrderNumberError::Malformed)?;
        NaiveDate::parse_from_str(prefix, DATE_FORMAT).map_err(|_| OrderNumberError::InvalidDate)?;
        Ok(Self(s.to_owned()))
    }

    /// The date the order was created.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.0
            .get(..DATE_LEN)
            .and_then(|p| NaiveDate::parse_from_str(p, DATE_FORMAT).ok())
    }

    /// Returns the order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_from_parts() {
        let number = OrderNumber::from_parts(date(), OrderId::new(42));
        assert_eq!(number.as_str(), "2026101642");
        assert_eq!(number.date(), Some(date()));
    }

    #[test]
    fn test_parse_accepts_generated_numbers() {
        let number = OrderNumber::from_parts(date(), OrderId::new(7));
        assert_eq!(OrderNumber::parse(number.as_str()).unwrap(), number);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(OrderNumber::parse("20261016"), Err(OrderNumberError::Malformed));
        assert_eq!(OrderNumber::parse("abc"), Err(OrderNumberError::Malformed));
        assert_eq!(OrderNumber::parse("2026101'; --"), Err(OrderNumberError::Malformed));
        assert_eq!(OrderNumber::parse("20261340123"), Err(OrderNumberError::InvalidDate));
    }

    #[test]
    fn test_distinct_ids_give_distinct_numbers() {
        let a = OrderNumber::from_parts(date(), OrderId::new(1));
        let b = OrderNumber::from_parts(date(), OrderId::new(11));
        assert_ne!(a, b);
    }
}
