//! Product variation matching.
//!
//! A product declares variations (e.g. `color=red`, `color=blue`,
//! `size=M`). A shopper's selection must pick exactly one value for every
//! category the product declares. Resolved selections are kept as a
//! [`VariationSet`], a sorted set of variation ids, so two selections are the
//! same line item exactly when their sets are equal, regardless of the order
//! the options were submitted in.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{ProductId, VariationId};

/// A selectable option declared by a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub id: VariationId,
    pub product_id: ProductId,
    /// Option name, e.g. `color`.
    pub category: String,
    /// Option value, e.g. `red`.
    pub value: String,
    /// Inactive variations are hidden from selection and not required.
    pub is_active: bool,
}

/// Errors resolving a shopper's selection against a product's variations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VariationError {
    /// Required categories were not selected.
    #[error("please select: {}", .missing.join(", "))]
    SelectionIncomplete {
        /// Missing categories, sorted.
        missing: Vec<String>,
    },
    /// The pair does not exist for this product, or the category was selected twice.
    #[error("invalid selection {category}={value}")]
    InvalidSelection { category: String, value: String },
}

/// Canonical identity of a resolved selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariationSet(BTreeSet<VariationId>);

impl VariationSet {
    /// The empty selection, for products that declare no variations.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of selected variations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Selected ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = VariationId> + '_ {
        self.0.iter().copied()
    }

    /// Whether `id` is part of the selection.
    #[must_use]
    pub fn contains(&self, id: VariationId) -> bool {
        self.0.contains(&id)
    }

    /// `(category, value)` pairs for display, in id order. Ids not found in
    /// `declared` are skipped.
    #[must_use]
    pub fn describe(&self, declared: &[Variation]) -> Vec<(String, String)> {
        self.ids()
            .filter_map(|id| declared.iter().find(|v| v.id == id))
            .map(|v| (v.category.clone(), v.value.clone()))
            .collect()
    }
}

impl FromIterator<VariationId> for VariationSet {
    fn from_iter<I: IntoIterator<Item = VariationId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolve requested `(category, value)` pairs against a product's declared
/// variations.
///
/// Matching is case-insensitive on both category and value. Inactive
/// variations neither match nor count as required.
///
/// # Errors
///
/// - [`VariationError::InvalidSelection`] if a pair does not exist for the
///   product or a category is selected more than once.
/// - [`VariationError::SelectionIncomplete`] if any declared category has no
///   selection.
pub fn resolve<C, V>(requested: &[(C, V)], declared: &[Variation]) -> Result<VariationSet, VariationError>
where
    C: AsRef<str>,
    V: AsRef<str>,
{
    let active: Vec<&Variation> = declared.iter().filter(|v| v.is_active).collect();

    let mut selected_categories: Vec<String> = Vec::with_capacity(requested.len());
    let mut ids = BTreeSet::new();

    for (category, value) in requested {
        let (category, value) = (category.as_ref().trim(), value.as_ref().trim());
        let invalid = || VariationError::InvalidSelection {
            category: category.to_owned(),
            value: value.to_owned(),
        };

        let found = active
            .iter()
            .find(|v| v.category.eq_ignore_ascii_case(category) && v.value.eq_ignore_ascii_case(value))
            .ok_or_else(invalid)?;

        let key = found.category.to_ascii_lowercase();
        if selected_categories.contains(&key) {
            return Err(invalid());
        }
        selected_categories.push(key);
        ids.insert(found.id);
    }

    let mut missing: Vec<String> = Vec::new();
    for v in &active {
        let key = v.category.to_ascii_lowercase();
        if !selected_categories.contains(&key) && !missing.iter().any(|m| m.eq_ignore_ascii_case(&v.category)) {
            missing.push(v.category.clone());
        }
    }

    if !missing.is_empty() {
        missing.sort();
        return Err(VariationError::SelectionIncomplete { missing });
    }

    Ok(VariationSet(ids))
}
