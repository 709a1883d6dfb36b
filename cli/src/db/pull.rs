//! `nubase db pull` - refresh the snapshot from the live database.

use anyhow::{Context, Result};
use colored::*;
use nubase_pg::generate::GenerateOptions;
use nubase_pg::model::SchemaModel;

use crate::db::load_context;
use crate::{files, snapshot};

pub async fn db_pull(env: Option<&str>) -> Result<()> {
    let ctx = load_context(env)?;
    println!("{} Pulling schema from '{}'...", "→".cyan(), ctx.env.yellow());

    let pool = nubase_pg::connect(&ctx.url).await?;
    let result = run(&ctx, &pool).await;
    pool.close().await;
    result
}

async fn run(ctx: &crate::db::CommandContext, pool: &nubase_pg::PgPool) -> Result<()> {
    let live = nubase_pg::extract(pool, &ctx.schemas).await?;
    let path = snapshot::save(&ctx.project.snapshots_dir(), &ctx.env, &live)?;
    println!(
        "{} Snapshot saved to {} ({} tables)",
        "✓".green(),
        path.display(),
        live.tables.len()
    );

    // First pull against an existing database bootstraps the migration
    // history with one file describing everything already there.
    let existing = files::list(&ctx.project.migrations_dir())?;
    if existing.is_empty() {
        let empty = SchemaModel::empty(&live.database_name);
        let diff = nubase_pg::diff(&empty, &live);
        if diff.has_differences() {
            let plan = nubase_pg::generate(&diff, &GenerateOptions { include_destructive: true });
            let migration = files::write(&ctx.project.migrations_dir(), "initial", &plan.sql())
                .context("Failed to write initial migration")?;
            println!("{} Bootstrapped initial migration: {}", "✓".green(), migration.filename);
        }
    }
    Ok(())
}
