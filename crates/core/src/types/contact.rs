//! Contact and shipping details captured at checkout.
//!
//! An order keeps its own copy of these fields. They are never re-read from
//! the account after the order is placed.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when validating contact details.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContactError {
    /// A required field was blank.
    #[error("{field} is required")]
    Missing {
        /// Name of the missing field.
        field: &'static str,
    },
    /// A field exceeded its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
    /// The email address is malformed.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    /// The phone number contains characters other than digits, spaces, `+` or `-`.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
}

/// An email address with a non-empty local part and domain.
///
/// ```
/// use techbazaar_core::Email;
///
/// assert!(Email::parse("buyer@example.com").is_ok());
/// assert!(Email::parse("buyer@").is_err());
/// assert!(Email::parse("no-at-sign").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError`] if the value is empty, too long, or is not of
    /// the form `local@domain`.
    pub fn parse(s: &str) -> Result<Self, ContactError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ContactError::Missing { field: "email" });
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(ContactError::TooLong {
                field: "email",
                max: Self::MAX_LENGTH,
            });
        }

        match s.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(Self(s.to_owned()))
            }
            _ => Err(ContactError::InvalidEmail(s.to_owned())),
        }
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = ContactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// Shipping and contact snapshot for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Email,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub order_note: Option<String>,
}

/// Unvalidated checkout form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub order_note: Option<String>,
}

const MAX_FIELD_LENGTH: usize = 100;
const MAX_NOTE_LENGTH: usize = 500;

impl ContactForm {
    /// Validate the form into a [`ContactInfo`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ContactError`] encountered.
    pub fn validate(self) -> Result<ContactInfo, ContactError> {
        let phone = required("phone", &self.phone)?;
        if !phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '))
        {
            return Err(ContactError::InvalidPhone(phone));
        }

        Ok(ContactInfo {
            first_name: required("first_name", &self.first_name)?,
            last_name: required("last_name", &self.last_name)?,
            phone,
            email: Email::parse(&self.email)?,
            address_line_1: required("address_line_1", &self.address_line_1)?,
            address_line_2: optional("address_line_2", self.address_line_2, MAX_FIELD_LENGTH)?,
            city: required("city", &self.city)?,
            state: required("state", &self.state)?,
            country: required("country", &self.country)?,
            order_note: optional("order_note", self.order_note, MAX_NOTE_LENGTH)?,
        })
    }
}

impl ContactInfo {
    /// "First Last", as printed on receipts and sent to the gateway.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ContactError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ContactError::Missing { field });
    }
    if value.chars().count() > MAX_FIELD_LENGTH {
        return Err(ContactError::TooLong {
            field,
            max: MAX_FIELD_LENGTH,
        });
    }
    Ok(value.to_owned())
}

fn optional(
    field: &'static str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ContactError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > max {
        return Err(ContactError::TooLong { field, max });
    }
    Ok(Some(value.to_owned()))
}
