//! Subcommand implementations.

pub mod migrate;
pub mod orders;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

/// Errors shared by the database-backed commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read the storefront database URL from the environment.
///
/// `STOREFRONT_DATABASE_URL` wins over `DATABASE_URL`, matching the server.
///
/// # Errors
///
/// Returns `CommandError::MissingEnvVar` if neither variable is set.
pub fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}

/// Connect to the storefront database.
///
/// # Errors
///
/// Returns `CommandError` if the URL is missing or the connection fails.
pub async fn connect() -> Result<sqlx::PgPool, CommandError> {
    let url = database_url()?;
    tracing::info!("Connecting to storefront database...");
    Ok(techbazaar_storefront::db::create_pool(&url).await?)
}
