//! TechBazaar CLI - database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! tb-cli migrate
//!
//! # Load products from a YAML file
//! tb-cli seed catalog demos/catalog.yaml
//!
//! # Abandon an unpaid order
//! tb-cli orders abandon 2026101642
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed catalog` - Insert products and their variations
//! - `orders abandon` - Close out an order that will never be paid

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use techbazaar_core::OrderNumber;

mod commands;

#[derive(Parser)]
#[command(name = "tb-cli")]
#[command(author, version, about = "TechBazaar CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Maintain orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert products from a YAML file
    Catalog {
        /// Path to the catalog file
        file: String,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// Mark an unpaid order as abandoned
    Abandon {
        /// Order number, e.g. 2026101642
        order_number: OrderNumber,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Catalog { file } => commands::seed::catalog(&file).await?,
        },
        Commands::Orders { action } => match action {
            OrdersAction::Abandon { order_number } => {
                commands::orders::abandon(&order_number).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_abandon_parses_order_number() {
        let cli = Cli::try_parse_from(["tb-cli", "orders", "abandon", "2026101642"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Orders { action: OrdersAction::Abandon { .. } })
        ));
        assert!(Cli::try_parse_from(["tb-cli", "orders", "abandon", "not-a-number"]).is_err());
    }
}
