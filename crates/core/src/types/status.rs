//! Status enums for orders, payments and gateway callbacks.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an order.
///
/// ```text
/// Unordered ──► Ordered ──► Paid
///     │            │
///     └────────────┴──────► Abandoned
/// ```
///
/// `Paid` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created from a cart; no payment session yet.
    #[default]
    Unordered,
    /// A gateway session was opened; awaiting the callback.
    Ordered,
    /// Payment recorded, stock decremented, cart cleared.
    Paid,
    /// Given up on; retained for audit, never fulfilled.
    Abandoned,
}

impl OrderStatus {
    /// States from which a successful payment may still finalize the order.
    pub const PAYABLE: [Self; 2] = [Self::Unordered, Self::Ordered];

    /// Whether a payment callback may still finalize an order in this state.
    #[must_use]
    pub const fn is_payable(self) -> bool {
        matches!(self, Self::Unordered | Self::Ordered)
    }

    /// Whether no further transitions are allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Abandoned)
    }

    /// Whether `self -> to` is an edge of the lifecycle.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Unordered, Self::Ordered | Self::Paid | Self::Abandoned)
                | (Self::Ordered, Self::Paid | Self::Abandoned)
        )
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unordered => "unordered",
            Self::Ordered => "ordered",
            Self::Paid => "paid",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unordered" => Ok(Self::Unordered),
            "ordered" => Ok(Self::Ordered),
            "paid" => Ok(Self::Paid),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Status of a recorded payment.
///
/// Only completed payments are recorded; the gateway's other outcomes never
/// produce a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Completed,
}

/// Which gateway endpoint a callback arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Success,
    Fail,
    Cancel,
}

impl std::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Fail => write!(f, "fail"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(OrderStatus::Unordered.can_transition_to(OrderStatus::Ordered));
        assert!(OrderStatus::Unordered.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Ordered.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Ordered.can_transition_to(OrderStatus::Abandoned));

        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Unordered));
        assert!(!OrderStatus::Abandoned.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Ordered.can_transition_to(OrderStatus::Unordered));
    }

    #[test]
    fn test_payable_states_are_not_terminal() {
        for status in OrderStatus::PAYABLE {
            assert!(status.is_payable());
            assert!(!status.is_terminal());
        }
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Abandoned.is_terminal());
    }

    #[test]
    fn test_string_roundtrip() {
        for status in [
            OrderStatus::Unordered,
            OrderStatus::Ordered,
            OrderStatus::Paid,
            OrderStatus::Abandoned,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(serde_json::to_string(&OrderStatus::Paid).unwrap(), "\"paid\"");
        assert_eq!(serde_json::to_string(&CallbackKind::Cancel).unwrap(), "\"cancel\"");
    }
}
