//! `nubase db reset` - wipe the schema and replay every migration.
//!
//! Guarded against accidents: refuses any environment other than `local`
//! without `--force`, and prompts before dropping unless `--yes`.

use anyhow::{Context, Result, bail};
use colored::*;
use nubase_pg::ledger;

use crate::db::{confirm, load_context};
use crate::files;
use crate::snapshot;

pub async fn db_reset(env: Option<&str>, force: bool, yes: bool) -> Result<()> {
    let ctx = load_context(env)?;

    if ctx.env != "local" && !force {
        bail!(
            "Refusing to reset environment '{}' (only 'local' may be reset without --force)",
            ctx.env
        );
    }

    println!("{} Resetting '{}'...", "→".cyan(), ctx.env.yellow());
    if !yes && !confirm(&format!("Drop schema 'public' on '{}' and replay all migrations?", ctx.env))?
    {
        println!("{}", "Aborted, no changes made".yellow());
        return Ok(());
    }

    let pool = nubase_pg::connect(&ctx.url).await?;
    let result = run(&ctx, &pool).await;
    pool.close().await;
    result
}

async fn run(ctx: &crate::db::CommandContext, pool: &nubase_pg::PgPool) -> Result<()> {
    sqlx::raw_sql("DROP SCHEMA public CASCADE; CREATE SCHEMA public")
        .execute(pool)
        .await
        .context("Failed to recreate schema 'public'")?;
    println!("  {} schema 'public' recreated", "✓".green());

    ledger::ensure_table(pool).await?;

    // Blank slate: replay everything, not just the pending set.
    let all = files::list(&ctx.project.migrations_dir())?;
    for file in &all {
        let sql = file.read_sql()?;
        ledger::apply(pool, &file.name, &sql)
            .await
            .with_context(|| format!("Migration '{}' failed (rolled back)", file.name))?;
        println!("  {} {}", "✓".green(), file.filename);
    }

    let live = nubase_pg::extract(pool, &ctx.schemas).await?;
    snapshot::save(&ctx.project.snapshots_dir(), &ctx.env, &live)?;
    println!("{} Replayed {} migration(s), snapshot updated", "✓".green(), all.len());
    Ok(())
}
