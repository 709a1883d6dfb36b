//! Applied-migration ledger.
//!
//! A single bookkeeping table records which migration files have already run
//! against a database. Applying a migration executes its SQL and inserts the
//! ledger row inside one transaction, so a failed script leaves neither a
//! partial ledger entry nor (for transactional DDL) partial schema changes.

use std::collections::BTreeSet;

use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::PgError;

/// Name of the bookkeeping table. Lives in the default schema of the target
/// database; the extractor excludes it (and its id sequence) so it never
/// appears in snapshots or generated migrations.
pub const LEDGER_TABLE: &str = "_nubase_migrations";

/// DDL for the ledger table, idempotent by construction.
pub fn ledger_table_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (\n  \
         id serial PRIMARY KEY,\n  \
         name text UNIQUE NOT NULL,\n  \
         applied_at timestamptz NOT NULL DEFAULT now()\n)"
    )
}

/// Create the ledger table if it does not exist yet.
pub async fn ensure_table(pool: &PgPool) -> Result<(), PgError> {
    sqlx::query(&ledger_table_ddl()).execute(pool).await?;
    Ok(())
}

/// Names of all migrations recorded as applied, in application order.
pub async fn applied(pool: &PgPool) -> Result<BTreeSet<String>, PgError> {
    let rows = sqlx::query(&format!("SELECT name FROM {LEDGER_TABLE} ORDER BY id"))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|row| row.get("name")).collect())
}

/// Run one migration script and record it, atomically.
///
/// The script may contain multiple statements; `raw_sql` sends it verbatim.
/// Any failure rolls the transaction back and surfaces as
/// [`PgError::Apply`] carrying the migration name.
pub async fn apply(pool: &PgPool, name: &str, sql: &str) -> Result<(), PgError> {
    let wrap = |source: sqlx::Error| PgError::Apply { name: name.to_string(), source };

    let mut tx = pool.begin().await.map_err(wrap)?;
    sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(wrap)?;
    sqlx::query(&format!("INSERT INTO {LEDGER_TABLE} (name) VALUES ($1)"))
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(wrap)?;
    tx.commit().await.map_err(wrap)?;
    tracing::debug!(migration = name, "applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_creates_expected_columns() {
        let ddl = ledger_table_ddl();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS _nubase_migrations"));
        assert!(ddl.contains("id serial PRIMARY KEY"));
        assert!(ddl.contains("name text UNIQUE NOT NULL"));
        assert!(ddl.contains("applied_at timestamptz NOT NULL DEFAULT now()"));
    }
}
