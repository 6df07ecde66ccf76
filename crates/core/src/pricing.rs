//! Cart and order totals.
//!
//! [`compute_totals`] is the single place totals are calculated. The cart
//! page, the checkout preview and order creation all call it, so the amount
//! shown to the shopper is the amount charged.

use serde::{Deserialize, Serialize};

use crate::types::Money;

/// Flat-rate shipping with a free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    /// Subtotals strictly greater than this ship free.
    pub free_threshold: Money,
    /// Charged when the subtotal is at or below the threshold.
    pub flat_fee: Money,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            free_threshold: Money::from_units(5000),
            flat_fee: Money::from_units(150),
        }
    }
}

impl ShippingPolicy {
    /// Shipping charged for `subtotal`. The threshold is exclusive: a
    /// subtotal exactly equal to it pays the flat fee.
    #[must_use]
    pub fn charge_for(&self, subtotal: Money) -> Money {
        if subtotal > self.free_threshold {
            Money::ZERO
        } else {
            self.flat_fee
        }
    }
}

/// Totals for a set of priced lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Σ unit price × quantity.
    pub subtotal: Money,
    pub shipping_charge: Money,
    /// `subtotal + shipping_charge`.
    pub grand_total: Money,
    /// Σ quantity.
    pub item_count: u32,
}

/// Compute totals for `(unit_price, quantity)` lines.
///
/// An empty cart has a zero subtotal and still reports the flat fee, which
/// matches what the cart page displays; checkout refuses empty carts before
/// totals matter.
pub fn compute_totals<I>(lines: I, policy: &ShippingPolicy) -> CartTotals
where
    I: IntoIterator<Item = (Money, u32)>,
{
    let (subtotal, item_count) = lines
        .into_iter()
        .fold((Money::ZERO, 0_u32), |(sum, count), (price, qty)| {
            (sum + price.times(qty), count.saturating_add(qty))
        });
    let shipping_charge = policy.charge_for(subtotal);

    CartTotals {
        subtotal,
        shipping_charge,
        grand_total: subtotal + shipping_charge,
        item_count,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_free_shipping_above_threshold() {
        let totals = compute_totals(
            [(Money::from_units(100), 2), (Money::from_units(5000), 1)],
            &ShippingPolicy::default(),
        );
        assert_eq!(totals.subtotal, Money::from_units(5200));
        assert_eq!(totals.shipping_charge, Money::ZERO);
        assert_eq!(totals.grand_total, Money::from_units(5200));
        assert_eq!(totals.item_count, 3);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let totals = compute_totals([(Money::from_units(2500), 2)], &ShippingPolicy::default());
        assert_eq!(totals.subtotal, Money::from_units(5000));
        assert_eq!(totals.shipping_charge, Money::from_units(150));
        assert_eq!(totals.grand_total, Money::from_units(5150));
    }

    #[test]
    fn test_small_cart_pays_flat_fee() {
        let totals = compute_totals([(Money::from_units(300), 1)], &ShippingPolicy::default());
        assert_eq!(totals.grand_total, Money::from_units(450));
    }

    #[test]
    fn test_custom_policy() {
        let policy = ShippingPolicy {
            free_threshold: Money::from_units(1000),
            flat_fee: Money::from_units(60),
        };
        assert_eq!(policy.charge_for(Money::from_units(1001)), Money::ZERO);
        assert_eq!(policy.charge_for(Money::from_units(1000)), Money::from_units(60));
    }

    proptest! {
        #[test]
        fn prop_grand_total_is_subtotal_plus_shipping(
            lines in proptest::collection::vec((1_i64..10_000, 1_u32..20), 0..8)
        ) {
            let policy = ShippingPolicy::default();
            let priced: Vec<(Money, u32)> =
                lines.iter().map(|&(p, q)| (Money::from_units(p), q)).collect();
            let totals = compute_totals(priced.iter().copied(), &policy);

            let expected: i64 = lines.iter().map(|&(p, q)| p * i64::from(q)).sum();
            prop_assert_eq!(totals.subtotal, Money::from_units(expected));
            prop_assert_eq!(totals.grand_total, totals.subtotal + totals.shipping_charge);
            prop_assert_eq!(totals.shipping_charge == Money::ZERO, expected > 5000);
        }
    }
}
