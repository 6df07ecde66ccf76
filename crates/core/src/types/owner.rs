//! Who a cart or wishlist belongs to.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::id::AccountId;

/// Opaque token identifying an anonymous visitor's cart and wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestToken(String);

impl GuestToken {
    /// Mint a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing token (e.g. read back from the session or database).
    #[must_use]
    pub fn from_string(token: String) -> Self {
        Self(token)
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner of a cart or wishlist: a signed-in account XOR a guest token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum CartOwner {
    Account(AccountId),
    Guest(GuestToken),
}

impl CartOwner {
    /// The account id, if the owner is signed in.
    #[must_use]
    pub const fn account(&self) -> Option<AccountId> {
        match self {
            Self::Account(id) => Some(*id),
            Self::Guest(_) => None,
        }
    }

    /// The guest token, if the owner is anonymous.
    #[must_use]
    pub const fn guest(&self) -> Option<&GuestToken> {
        match self {
            Self::Account(_) => None,
            Self::Guest(token) => Some(token),
        }
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(id) => write!(f, "account:{id}"),
            Self::Guest(token) => write!(f, "guest:{token}"),
        }
    }
}

impl From<AccountId> for CartOwner {
    fn from(id: AccountId) -> Self {
        Self::Account(id)
    }
}

impl From<GuestToken> for CartOwner {
    fn from(token: GuestToken) -> Self {
        Self::Guest(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(GuestToken::generate(), GuestToken::generate());
        assert_eq!(GuestToken::generate().as_str().len(), 32);
    }

    #[test]
    fn test_accessors() {
        let account = CartOwner::from(AccountId::new(5));
        assert_eq!(account.account(), Some(AccountId::new(5)));
        assert!(account.guest().is_none());

        let guest = CartOwner::from(GuestToken::from_string("abc".to_string()));
        assert!(guest.account().is_none());
        assert_eq!(guest.guest().map(GuestToken::as_str), Some("abc"));
        assert_eq!(guest.to_string(), "guest:abc");
    }
}
