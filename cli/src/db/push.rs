//! `nubase db push` - apply pending migrations.
//!
//! Pending means "listed on disk but absent from the ledger". Each pending
//! file runs inside its own transaction; the first failure stops the batch,
//! leaving earlier migrations committed and later ones untouched. Re-running
//! push resumes from the failed file.

use anyhow::{Context, Result};
use colored::*;
use nubase_pg::ledger;

use crate::db::{confirm, load_context};
use crate::files;
use crate::snapshot;

pub async fn db_push(env: Option<&str>, dry_run: bool, yes: bool) -> Result<()> {
    let ctx = load_context(env)?;
    println!("{} Pushing migrations to '{}'...", "→".cyan(), ctx.env.yellow());

    let pool = nubase_pg::connect(&ctx.url).await?;
    let result = run(&ctx, &pool, dry_run, yes).await;
    pool.close().await;
    result
}

async fn run(
    ctx: &crate::db::CommandContext,
    pool: &nubase_pg::PgPool,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    ledger::ensure_table(pool).await?;
    let applied = ledger::applied(pool).await?;
    let all = files::list(&ctx.project.migrations_dir())?;
    let pending = files::pending(all, &applied);

    if pending.is_empty() {
        println!("{} Nothing to apply ({} already in ledger)", "✓".green(), applied.len());
        return Ok(());
    }

    println!("  {} pending:", pending.len());
    for file in &pending {
        println!("    {} {}", "○".dimmed(), file.filename);
    }

    if dry_run {
        println!();
        println!("  Dry run, nothing applied");
        return Ok(());
    }

    if !yes && !confirm(&format!("Apply {} migration(s)?", pending.len()))? {
        println!("{}", "Aborted, no changes made".yellow());
        return Ok(());
    }

    for file in &pending {
        let sql = file.read_sql()?;
        ledger::apply(pool, &file.name, &sql)
            .await
            .with_context(|| format!("Migration '{}' failed (rolled back)", file.name))?;
        println!("  {} {}", "✓".green(), file.filename);
    }

    let live = nubase_pg::extract(pool, &ctx.schemas).await?;
    snapshot::save(&ctx.project.snapshots_dir(), &ctx.env, &live)?;
    println!("{} Applied {} migration(s), snapshot updated", "✓".green(), pending.len());
    Ok(())
}
