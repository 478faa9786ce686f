//! BookSwap CLI - Session migrations and image diagnostics.
//!
//! # Usage
//!
//! ```bash
//! # Create the session store schema
//! bookswap migrate
//!
//! # Show the candidate URLs for a stored image reference
//! bookswap images candidates books/dune.jpg
//!
//! # Probe the candidates and report which one loads
//! bookswap images probe books/dune.jpg
//! ```
//!
//! # Commands
//!
//! - `migrate` - Create the `PostgreSQL` session table
//! - `images` - Inspect image reference resolution

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bookswap")]
#[command(author, version, about = "BookSwap CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the session store schema
    Migrate,
    /// Inspect image reference resolution
    Images {
        #[command(subcommand)]
        action: ImagesAction,
    },
}

#[derive(Subcommand)]
enum ImagesAction {
    /// List candidate URLs in the order they are tried
    Candidates {
        /// Image reference as stored by the API
        reference: String,
    },
    /// Probe every candidate and report the one that loads
    Probe {
        /// Image reference as stored by the API
        reference: String,
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
        Commands::Images { action } => match action {
            ImagesAction::Candidates { reference } => commands::images::candidates(&reference)?,
            ImagesAction::Probe { reference } => commands::images::probe(&reference).await?,
        },
    }
    Ok(())
}
