//! TechBazaar Core - Shared types library.
//!
//! This crate provides the types and pure functions shared by the TechBazaar
//! components:
//! - `storefront` - Public-facing shop, checkout and payment callbacks
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Everything here can be unit tested
//! without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, contact details, order
//!   numbers, cart owners and lifecycle statuses
//! - [`variation`] - Resolving and comparing product option selections
//! - [`pricing`] - Cart totals and the shipping policy

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;
pub mod variation;

pub use pricing::{CartTotals, ShippingPolicy, compute_totals};
pub use types::*;
pub use variation::{Variation, VariationError, VariationSet};
