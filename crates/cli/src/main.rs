//! Unimarket CLI - Database migrations and admin management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations (including the session table)
//! um-cli migrate
//!
//! # Give a registered user access to the withdrawal review queue
//! um-cli admin promote -e staff@ui.ac.id
//!
//! # Take it away again
//! um-cli admin demote -e staff@ui.ac.id
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use unimarket_core::UserRole;

mod commands;

#[derive(Parser)]
#[command(name = "um-cli")]
#[command(author, version, about = "Unimarket CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Grant the admin role to an existing user
    Promote {
        /// Email the user registered with
        #[arg(short, long)]
        email: String,
    },
    /// Revoke the admin role
    Demote {
        /// Email the user registered with
        #[arg(short, long)]
        email: String,
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
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Promote { email } => {
                commands::admin::set_role(&email, UserRole::Admin).await?;
            }
            AdminAction::Demote { email } => {
                commands::admin::set_role(&email, UserRole::User).await?;
            }
        },
    }
    Ok(())
}
