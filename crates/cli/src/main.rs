//! Roster CLI - Database migrations and seeding.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! roster migrate
//!
//! # Insert the position catalogue
//! roster seed positions
//!
//! # Insert 45 demo users sharing one photo
//! roster seed users --count 45 --photo assets/default.jpg
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed positions` - Seed the position catalogue
//! - `seed users` - Seed demo users

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "roster")]
#[command(author, version, about = "Roster CLI tools")]
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
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert the position catalogue (idempotent)
    Positions,
    /// Insert demo users
    Users {
        /// Number of users to create
        #[arg(short, long, default_value_t = 45)]
        count: usize,

        /// JPEG or PNG used as every user's photo
        #[arg(short, long)]
        photo: PathBuf,
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
        Commands::Seed { target } => match target {
            SeedTarget::Positions => commands::seed::positions().await?,
            SeedTarget::Users { count, photo } => commands::seed::users(count, &photo).await?,
        },
    }
    Ok(())
}
