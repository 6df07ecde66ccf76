//! Catalog records: products with their live stock counter.

use serde::{Deserialize, Serialize};

use techbazaar_core::{Money, ProductId};

/// A product as currently stocked and priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    /// Current unit price. Orders snapshot this at finalization.
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock: u32,
    /// Hidden from sale when false, regardless of stock.
    pub is_available: bool,
}

impl Product {
    /// Whether `quantity` units can be sold right now.
    #[must_use]
    pub const fn can_supply(&self, quantity: u32) -> bool {
        self.is_available && self.stock >= quantity
    }
}

/// A product to insert (catalog seeding).
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub price: Money,
    pub stock: u32,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default)]
    pub variations: Vec<NewVariation>,
}

/// A variation to declare on a new product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVariation {
    pub category: String,
    pub value: String,
}

const fn default_available() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_supply() {
        let product = Product {
            id: ProductId::new(1),
            name: "Keyboard".to_string(),
            slug: "keyboard".to_string(),
            price: Money::from_units(100),
            stock: 2,
            is_available: true,
        };
        assert!(product.can_supply(2));
        assert!(!product.can_supply(3));
        assert!(!Product { is_available: false, ..product }.can_supply(1));
    }
}
