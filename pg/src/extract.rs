//! Live-database schema extraction.
//!
//! Connects to a Postgres server and introspects the configured schemas into
//! a [`SchemaModel`] in one logical pass, so cross-references (a foreign key
//! naming another table, a trigger naming a function) always resolve to
//! names present in the same snapshot. Strictly read-only: only catalog and
//! information_schema queries are issued.
//!
//! Any failed introspection query aborts the whole extraction with
//! [`PgError::Extraction`] naming the object category - a partial snapshot
//! is never returned.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use crate::error::PgError;
use crate::ledger::LEDGER_TABLE;
use crate::model::{
    CollationDescriptor, ColumnDescriptor, ConstraintDescriptor, ConstraintKind, DomainDescriptor,
    EnumDescriptor, ExtensionDescriptor, ForeignKeyAction, FunctionDescriptor,
    MaterializedViewDescriptor, PolicyDescriptor, PrivilegeDescriptor, SchemaModel,
    SequenceDescriptor, TableDescriptor, TriggerDescriptor, ViewDescriptor,
};

/// Open a single-connection pool for one CLI invocation. The caller owns the
/// pool and must close it on every exit path.
pub async fn connect(url: &str) -> Result<PgPool, PgError> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .map_err(PgError::Connection)
}

/// Extract the full schema model for the given schemas (usually `public`).
pub async fn extract(pool: &PgPool, schemas: &[String]) -> Result<SchemaModel, PgError> {
    let schemas = schemas.to_vec();
    tracing::debug!(schemas = ?schemas, "extracting schema");

    let server = sqlx::query(
        "SELECT current_setting('server_version') AS pg_version, current_database() AS database_name",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| extraction("server", e))?;

    let mut model = SchemaModel::empty(server.get::<String, _>("database_name"));
    model.pg_version = server.get("pg_version");
    model.extracted_at = Utc::now();

    model.tables = extract_tables(pool, &schemas).await?;
    extract_columns(pool, &schemas, &mut model.tables).await?;
    extract_constraints(pool, &schemas, &mut model.tables).await?;
    extract_indexes(pool, &schemas, &mut model.tables).await?;
    model.enums = extract_enums(pool, &schemas).await?;
    model.sequences = extract_sequences(pool, &schemas).await?;
    model.views = extract_views(pool, &schemas).await?;
    model.materialized_views = extract_materialized_views(pool, &schemas).await?;
    model.functions = extract_functions(pool, &schemas).await?;
    model.triggers = extract_triggers(pool, &schemas).await?;
    model.extensions = extract_extensions(pool).await?;
    model.domains = extract_domains(pool, &schemas).await?;
    model.collations = extract_collations(pool, &schemas).await?;
    model.policies = extract_policies(pool, &schemas, &mut model.tables).await?;
    model.privileges = extract_privileges(pool, &schemas).await?;

    tracing::debug!(
        tables = model.tables.len(),
        enums = model.enums.len(),
        "extraction complete"
    );
    Ok(model)
}

fn extraction(category: &'static str, source: sqlx::Error) -> PgError {
    PgError::Extraction { category, source }
}

/// Objects the toolkit itself creates in the target database. They are
/// bookkeeping, not schema: including them in a snapshot would put a
/// `CREATE TABLE _nubase_migrations` into generated migrations, which can
/// never replay because the ledger is bootstrapped before any migration
/// runs.
fn is_ledger_object(name: &str) -> bool {
    name == LEDGER_TABLE
        || name
            .strip_prefix(LEDGER_TABLE)
            .is_some_and(|rest| rest.starts_with('_'))
}

async fn extract_tables(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, TableDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT c.relname AS table_name, c.relrowsecurity AS rls_enabled
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind = 'r' AND n.nspname = ANY($1)
        ORDER BY c.relname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("tables", e))?;

    let mut tables = BTreeMap::new();
    for row in rows {
        let name: String = row.get("table_name");
        if is_ledger_object(&name) {
            continue;
        }
        let mut table = TableDescriptor::new(name.clone());
        table.rls_enabled = row.get("rls_enabled");
        tables.insert(name, table);
    }
    Ok(tables)
}

async fn extract_columns(
    pool: &PgPool,
    schemas: &[String],
    tables: &mut BTreeMap<String, TableDescriptor>,
) -> Result<(), PgError> {
    let rows = sqlx::query(
        r#"
        SELECT table_name::text, column_name::text, data_type::text,
               is_nullable::text, column_default::text,
               character_maximum_length::int4, numeric_precision::int4,
               numeric_scale::int4
        FROM information_schema.columns
        WHERE table_schema = ANY($1)
        ORDER BY table_name, ordinal_position
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("columns", e))?;

    for row in rows {
        let table_name: String = row.get("table_name");
        let Some(table) = tables.get_mut(&table_name) else {
            // Views also appear in information_schema.columns.
            continue;
        };
        table.columns.push(column_from_row(&row));
    }
    Ok(())
}

fn column_from_row(row: &PgRow) -> ColumnDescriptor {
    let data_type: String = row.get("data_type");
    let is_nullable: String = row.get("is_nullable");
    let is_character = matches!(
        data_type.as_str(),
        "character varying" | "character" | "bit" | "bit varying"
    );
    let is_numeric = matches!(data_type.as_str(), "numeric" | "decimal");
    ColumnDescriptor {
        name: row.get("column_name"),
        nullable: is_nullable == "YES",
        default: row.get("column_default"),
        // Length applies to character types only; Postgres reports a bit
        // width for every integer column, which must not leak into the type.
        max_length: if is_character { row.get("character_maximum_length") } else { None },
        numeric_precision: if is_numeric { row.get("numeric_precision") } else { None },
        numeric_scale: if is_numeric { row.get("numeric_scale") } else { None },
        data_type,
    }
}

async fn extract_constraints(
    pool: &PgPool,
    schemas: &[String],
    tables: &mut BTreeMap<String, TableDescriptor>,
) -> Result<(), PgError> {
    let rows = sqlx::query(
        r#"
        SELECT con.conname AS name,
               rel.relname AS table_name,
               con.contype::text AS contype,
               (SELECT array_agg(a.attname::text ORDER BY k.ord)
                  FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                  JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
               ) AS columns,
               frel.relname AS references_table,
               (SELECT array_agg(a.attname::text ORDER BY k.ord)
                  FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                  JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
               ) AS references_columns,
               con.confdeltype::text AS on_delete,
               con.confupdtype::text AS on_update,
               pg_get_constraintdef(con.oid) AS definition
        FROM pg_constraint con
        JOIN pg_class rel ON rel.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = rel.relnamespace
        LEFT JOIN pg_class frel ON frel.oid = con.confrelid
        WHERE n.nspname = ANY($1) AND con.contype IN ('p', 'f', 'u', 'c')
        ORDER BY rel.relname, con.conname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("constraints", e))?;

    for row in rows {
        let table_name: String = row.get("table_name");
        let Some(table) = tables.get_mut(&table_name) else { continue };
        let contype: String = row.get("contype");
        let columns: Vec<String> = row
            .get::<Option<Vec<String>>, _>("columns")
            .unwrap_or_default();
        let kind = match contype.as_str() {
            "p" => ConstraintKind::PrimaryKey { columns },
            "u" => ConstraintKind::Unique { columns },
            "f" => ConstraintKind::ForeignKey {
                columns,
                references_table: row
                    .get::<Option<String>, _>("references_table")
                    .unwrap_or_default(),
                references_columns: row
                    .get::<Option<Vec<String>>, _>("references_columns")
                    .unwrap_or_default(),
                on_delete: ForeignKeyAction::from_code(row.get::<String, _>("on_delete").as_str()),
                on_update: ForeignKeyAction::from_code(row.get::<String, _>("on_update").as_str()),
            },
            _ => {
                let definition: String = row.get("definition");
                ConstraintKind::Check {
                    expression: definition.strip_prefix("CHECK ").unwrap_or(&definition).to_string(),
                }
            }
        };
        table.constraints.push(ConstraintDescriptor { name: row.get("name"), kind });
    }
    Ok(())
}

async fn extract_indexes(
    pool: &PgPool,
    schemas: &[String],
    tables: &mut BTreeMap<String, TableDescriptor>,
) -> Result<(), PgError> {
    // Primary-key and constraint-backing indexes are already covered by the
    // constraint descriptors and would only produce duplicate diff entries.
    let rows = sqlx::query(
        r#"
        SELECT ic.relname AS name,
               tc.relname AS table_name,
               ix.indisunique AS is_unique,
               am.amname AS method,
               (SELECT array_agg(a.attname::text ORDER BY k.ord)
                  FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                  JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
               ) AS columns
        FROM pg_index ix
        JOIN pg_class ic ON ic.oid = ix.indexrelid
        JOIN pg_class tc ON tc.oid = ix.indrelid
        JOIN pg_am am ON am.oid = ic.relam
        JOIN pg_namespace n ON n.oid = tc.relnamespace
        WHERE n.nspname = ANY($1)
          AND NOT ix.indisprimary
          AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = ix.indexrelid)
        ORDER BY tc.relname, ic.relname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("indexes", e))?;

    for row in rows {
        let table_name: String = row.get("table_name");
        let Some(table) = tables.get_mut(&table_name) else { continue };
        table.indexes.push(crate::model::IndexDescriptor {
            name: row.get("name"),
            columns: row.get::<Option<Vec<String>>, _>("columns").unwrap_or_default(),
            unique: row.get("is_unique"),
            method: row.get("method"),
        });
    }
    Ok(())
}

async fn extract_enums(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, EnumDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT t.typname AS name,
               array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS labels
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = ANY($1)
        GROUP BY t.typname
        ORDER BY t.typname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("enums", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get("name");
            (name.clone(), EnumDescriptor { name, values: row.get("labels") })
        })
        .collect())
}

async fn extract_sequences(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, SequenceDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT sequence_name::text, data_type::text, start_value::text,
               increment::text, minimum_value::text, maximum_value::text,
               cycle_option::text
        FROM information_schema.sequences
        WHERE sequence_schema = ANY($1)
        ORDER BY sequence_name
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("sequences", e))?;

    Ok(rows
        .into_iter()
        // The ledger's serial id owns a backing sequence; skip it too.
        .filter(|row| !is_ledger_object(&row.get::<String, _>("sequence_name")))
        .map(|row| {
            let name: String = row.get("sequence_name");
            let descriptor = SequenceDescriptor {
                name: name.clone(),
                data_type: row.get("data_type"),
                start_value: row.get("start_value"),
                increment: row.get("increment"),
                min_value: row.get("minimum_value"),
                max_value: row.get("maximum_value"),
                cycle: row.get::<String, _>("cycle_option") == "YES",
            };
            (name, descriptor)
        })
        .collect())
}

async fn extract_views(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, ViewDescriptor>, PgError> {
    let rows = sqlx::query(
        "SELECT viewname, definition FROM pg_views WHERE schemaname = ANY($1) ORDER BY viewname",
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("views", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get("viewname");
            (name.clone(), ViewDescriptor { name, definition: row.get("definition") })
        })
        .collect())
}

async fn extract_materialized_views(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, MaterializedViewDescriptor>, PgError> {
    let rows = sqlx::query(
        "SELECT matviewname, definition FROM pg_matviews WHERE schemaname = ANY($1) ORDER BY matviewname",
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("materialized views", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get("matviewname");
            (
                name.clone(),
                MaterializedViewDescriptor { name, definition: row.get("definition") },
            )
        })
        .collect())
}

async fn extract_functions(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, FunctionDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT p.proname AS name,
               pg_get_function_identity_arguments(p.oid) AS identity_args,
               l.lanname AS language,
               pg_get_functiondef(p.oid) AS definition
        FROM pg_proc p
        JOIN pg_namespace n ON n.oid = p.pronamespace
        JOIN pg_language l ON l.oid = p.prolang
        WHERE n.nspname = ANY($1) AND p.prokind = 'f'
        ORDER BY p.proname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("functions", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let descriptor = FunctionDescriptor {
                name: row.get("name"),
                identity_args: row.get("identity_args"),
                language: row.get("language"),
                definition: row.get("definition"),
            };
            (format!("{}({})", descriptor.name, descriptor.identity_args), descriptor)
        })
        .collect())
}

async fn extract_triggers(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, TriggerDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT t.tgname AS name,
               c.relname AS table_name,
               pg_get_triggerdef(t.oid) AS definition
        FROM pg_trigger t
        JOIN pg_class c ON c.oid = t.tgrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE NOT t.tgisinternal AND n.nspname = ANY($1)
        ORDER BY c.relname, t.tgname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("triggers", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let descriptor = TriggerDescriptor {
                name: row.get("name"),
                table: row.get("table_name"),
                definition: row.get("definition"),
            };
            (format!("{}.{}", descriptor.table, descriptor.name), descriptor)
        })
        .collect())
}

async fn extract_extensions(
    pool: &PgPool,
) -> Result<BTreeMap<String, ExtensionDescriptor>, PgError> {
    let rows = sqlx::query("SELECT extname, extversion FROM pg_extension ORDER BY extname")
        .fetch_all(pool)
        .await
        .map_err(|e| extraction("extensions", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get("extname");
            (name.clone(), ExtensionDescriptor { name, version: row.get("extversion") })
        })
        .collect())
}

async fn extract_domains(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, DomainDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT domain_name::text, data_type::text, domain_default::text
        FROM information_schema.domains
        WHERE domain_schema = ANY($1)
        ORDER BY domain_name
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("domains", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get("domain_name");
            let descriptor = DomainDescriptor {
                name: name.clone(),
                data_type: row.get("data_type"),
                default: row.get("domain_default"),
            };
            (name, descriptor)
        })
        .collect())
}

async fn extract_collations(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, CollationDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT c.collname AS name,
               c.collprovider::text AS provider,
               c.collcollate AS lc_collate,
               c.collctype AS lc_ctype
        FROM pg_collation c
        JOIN pg_namespace n ON n.oid = c.collnamespace
        WHERE n.nspname = ANY($1)
        ORDER BY c.collname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("collations", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get("name");
            let descriptor = CollationDescriptor {
                name: name.clone(),
                provider: row.get("provider"),
                lc_collate: row.get("lc_collate"),
                lc_ctype: row.get("lc_ctype"),
            };
            (name, descriptor)
        })
        .collect())
}

async fn extract_policies(
    pool: &PgPool,
    schemas: &[String],
    tables: &mut BTreeMap<String, TableDescriptor>,
) -> Result<BTreeMap<String, PolicyDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT tablename, policyname, permissive, roles::text[] AS roles,
               cmd, qual, with_check
        FROM pg_policies
        WHERE schemaname = ANY($1)
        ORDER BY tablename, policyname
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("policies", e))?;

    let mut policies = BTreeMap::new();
    for row in rows {
        let descriptor = PolicyDescriptor {
            name: row.get("policyname"),
            table: row.get("tablename"),
            permissive: row.get::<String, _>("permissive") == "PERMISSIVE",
            command: row.get("cmd"),
            roles: row.get("roles"),
            using_expr: row.get("qual"),
            check_expr: row.get("with_check"),
        };
        if let Some(table) = tables.get_mut(&descriptor.table) {
            table.policies.push(descriptor.clone());
        }
        policies.insert(descriptor.key(), descriptor);
    }
    Ok(policies)
}

async fn extract_privileges(
    pool: &PgPool,
    schemas: &[String],
) -> Result<BTreeMap<String, PrivilegeDescriptor>, PgError> {
    let rows = sqlx::query(
        r#"
        SELECT grantee::text, table_name::text,
               array_agg(privilege_type::text ORDER BY privilege_type) AS privileges
        FROM information_schema.role_table_grants
        WHERE table_schema = ANY($1)
        GROUP BY grantee, table_name
        ORDER BY table_name, grantee
        "#,
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| extraction("privileges", e))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let descriptor = PrivilegeDescriptor {
                grantee: row.get("grantee"),
                table: row.get("table_name"),
                privileges: row.get("privileges"),
            };
            (descriptor.key(), descriptor)
        })
        .filter(|(_, descriptor)| !is_ledger_object(&descriptor.table))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_objects_are_not_schema() {
        assert!(is_ledger_object("_nubase_migrations"));
        assert!(is_ledger_object("_nubase_migrations_id_seq"));
        assert!(!is_ledger_object("migrations"));
        assert!(!is_ledger_object("_nubase_migrationsx"));
        assert!(!is_ledger_object("tickets"));
    }
}
