//! Seed the storefront catalog from a YAML file.
//!
//! # Usage
//!
//! ```bash
//! tb-cli seed catalog demos/catalog.yaml
//! ```
//!
//! The file is a list of products:
//!
//! ```yaml
//! - name: Wireless Mouse
//!   slug: wireless-mouse
//!   price: "1150.00"
//!   stock: 40
//!   variations:
//!     - { category: color, value: black }
//!     - { category: color, value: white }
//! ```
//!
//! The whole file is inserted in one transaction: a duplicate slug rolls
//! everything back.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::{error, info};

use techbazaar_storefront::db::{PgStore, RepositoryError, Store};
use techbazaar_storefront::models::NewProduct;

use super::CommandError;

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Parse a catalog file's contents.
///
/// # Errors
///
/// Returns `SeedError::Yaml` if the document is not a list of products.
pub fn parse_catalog(content: &str) -> Result<Vec<NewProduct>, SeedError> {
    Ok(serde_yaml::from_str(content)?)
}

/// Check a parsed catalog, returning one message per problem.
#[must_use]
pub fn validate_catalog(products: &[NewProduct]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut slugs = HashSet::new();

    for (index, product) in products.iter().enumerate() {
        let label = if product.slug.is_empty() {
            format!("product #{}", index + 1)
        } else {
            product.slug.clone()
        };

        if product.name.trim().is_empty() {
            errors.push(format!("{label}: name is empty"));
        }
        if product.slug.trim().is_empty() {
            errors.push(format!("{label}: slug is empty"));
        } else if !slugs.insert(product.slug.as_str()) {
            errors.push(format!("{label}: slug appears more than once"));
        }
        if product.price.is_negative() {
            errors.push(format!("{label}: price is negative"));
        }

        let mut pairs = HashSet::new();
        for variation in &product.variations {
            if variation.category.trim().is_empty() || variation.value.trim().is_empty() {
                errors.push(format!("{label}: variation with empty category or value"));
            } else if !pairs.insert((variation.category.as_str(), variation.value.as_str())) {
                errors.push(format!(
                    "{label}: variation {}={} declared twice",
                    variation.category, variation.value
                ));
            }
        }
    }

    errors
}

/// Seed products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or validated, or the
/// database rejects an insert.
pub async fn catalog(file_path: &str) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::NotFound(file_path.to_string()));
    }

    info!(path = %file_path, "Loading catalog from file");

    // Validate before connecting
    let content = tokio::fs::read_to_string(path).await?;
    let products = parse_catalog(&content)?;
    info!(products = products.len(), "Parsed catalog");

    let errors = validate_catalog(&products);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(SeedError::Invalid(errors.len()));
    }

    let store = PgStore::new(super::connect().await?);
    let mut tx = store.begin().await?;
    let mut variations = 0;
    for product in products {
        variations += product.variations.len();
        let inserted = tx.insert_product(product).await?;
        info!(id = %inserted.id, slug = %inserted.slug, "Inserted product");
    }
    tx.commit().await?;

    info!("Seeding complete!");
    info!("  Variations inserted: {variations}");
    Ok(())
}
