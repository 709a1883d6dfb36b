//! `nubase db diff` - compare the stored snapshot against the live database.

use anyhow::{Context, Result};
use colored::*;
use nubase_pg::generate::GenerateOptions;
use nubase_pg::model::SchemaModel;

use crate::db::load_context;
use crate::{files, printer, snapshot};

pub async fn db_diff(env: Option<&str>, file: Option<&str>) -> Result<()> {
    let ctx = load_context(env)?;
    println!("{} Comparing '{}' against its snapshot...", "→".cyan(), ctx.env.yellow());

    let pool = nubase_pg::connect(&ctx.url).await?;
    let result = run(&ctx, &pool, file).await;
    pool.close().await;
    result
}

async fn run(
    ctx: &crate::db::CommandContext,
    pool: &nubase_pg::PgPool,
    file: Option<&str>,
) -> Result<()> {
    let live = nubase_pg::extract(pool, &ctx.schemas).await?;
    let base = snapshot::load(&ctx.project.snapshots_dir(), &ctx.env)?
        .unwrap_or_else(|| SchemaModel::empty(&live.database_name));

    let diff = nubase_pg::diff(&base, &live);
    printer::print_diff(&diff);

    if !diff.has_differences() {
        return Ok(());
    }

    if let Some(label) = file {
        let plan = nubase_pg::generate(&diff, &GenerateOptions { include_destructive: true });
        printer::print_warnings(&plan.warnings);

        let migration = files::write(&ctx.project.migrations_dir(), label, &plan.sql())
            .context("Failed to write migration file")?;
        println!("{} Wrote {}", "✓".green(), migration.path.display());

        // The migration now accounts for the gap, so the snapshot advances
        // to the live state.
        snapshot::save(&ctx.project.snapshots_dir(), &ctx.env, &live)?;
        println!("{} Snapshot updated", "✓".green());
    } else {
        println!("  Run {} to capture this as a migration", "nubase db diff -f <name>".cyan());
    }
    Ok(())
}
