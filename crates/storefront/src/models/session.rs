//! Session-related types.
//!
//! Types stored in the session for the signed-in account and guest carts.

use serde::{Deserialize, Serialize};

use techbazaar_core::{AccountId, Email};

/// Session-stored account identity.
///
/// Written by the sign-in hook in [`crate::services::accounts`]; credential
/// checks happen outside this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Account's database ID.
    pub id: AccountId,
    /// Account's email address.
    pub email: Email,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in account.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the anonymous visitor's cart token.
    pub const GUEST_TOKEN: &str = "guest_token";
}
