//! Core types for TechBazaar.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod contact;
pub mod id;
pub mod money;
pub mod order_number;
pub mod owner;
pub mod status;

pub use contact::{ContactError, ContactForm, ContactInfo, Email};
pub use id::*;
pub use money::{CurrencyCode, Money};
pub use order_number::{OrderNumber, OrderNumberError};
pub use owner::{CartOwner, GuestToken};
pub use status::*;
