//! nubase - keep Postgres schemas and migration files in agreement.
//!
//! Workflow: `db pull` snapshots the live schema (bootstrapping an initial
//! migration if none exist), `db diff` shows drift between snapshot and
//! live, `db push` applies pending migrations, `db reset` replays history
//! from a blank slate, and `migration new` scaffolds a hand-written file.

mod config;
mod db;
mod files;
mod migrations;
mod printer;
mod project;
mod snapshot;

use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nubase", version, about = "Schema-diff migration toolkit for Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database operations against a configured environment
    #[command(subcommand)]
    Db(DbCommands),
    /// Migration file management
    #[command(subcommand)]
    Migration(MigrationCommands),
}

#[derive(Subcommand)]
enum DbCommands {
    /// Compare the stored snapshot against the live database
    Diff {
        /// Environment from nubase.toml (default: config default, then 'local')
        #[arg(long)]
        env: Option<String>,
        /// Write the diff as a migration file with this name
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Apply pending migrations
    Push {
        #[arg(long)]
        env: Option<String>,
        /// List pending migrations without applying anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Extract the live schema into the snapshot store
    Pull {
        #[arg(long)]
        env: Option<String>,
    },
    /// Drop and recreate the public schema, then replay all migrations
    Reset {
        #[arg(long)]
        env: Option<String>,
        /// Allow resetting environments other than 'local'
        #[arg(long)]
        force: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum MigrationCommands {
    /// Create an empty timestamped .sql migration file
    New { name: String },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Db(DbCommands::Diff { env, file }) => {
            db::db_diff(env.as_deref(), file.as_deref()).await
        }
        Commands::Db(DbCommands::Push { env, dry_run, yes }) => {
            db::db_push(env.as_deref(), dry_run, yes).await
        }
        Commands::Db(DbCommands::Pull { env }) => db::db_pull(env.as_deref()).await,
        Commands::Db(DbCommands::Reset { env, force, yes }) => {
            db::db_reset(env.as_deref(), force, yes).await
        }
        Commands::Migration(MigrationCommands::New { name }) => migrations::migration_new(&name),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
