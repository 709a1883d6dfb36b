//! Turns a schema diff into ordered SQL migration statements.
//!
//! Two passes over the diff: all drops first, in reverse dependency order
//! (dependents before their dependencies), then all creations in forward
//! dependency order (referenced objects before objects that reference them,
//! with every foreign key deferred until every table exists).
//!
//! A destructive change always produces a [`Warning`]; the statement itself
//! is only included when `include_destructive` is set. The generator never
//! executes anything - output is advisory SQL text.

use crate::diff::{ColumnProperty, Replaced, SchemaDiff, TableChange};
use crate::model::{
    ColumnDescriptor, ConstraintDescriptor, ConstraintKind, EnumDescriptor, ForeignKeyAction,
    IndexDescriptor, PolicyDescriptor, PrivilegeDescriptor, TableDescriptor,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Include statements that can lose data (drops, narrowing casts).
    pub include_destructive: bool,
}

/// A destructive change the caller should surface to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub statements: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.warnings.is_empty()
    }

    /// Render as a migration file body: statements separated by blank lines.
    pub fn sql(&self) -> String {
        let mut body = self.statements.join("\n\n");
        if !body.is_empty() {
            body.push('\n');
        }
        body
    }
}

/// Generate ordered SQL for `diff`. An empty diff yields an empty plan.
pub fn generate(diff: &SchemaDiff, options: &GenerateOptions) -> MigrationPlan {
    let mut plan = Plan::new(options.include_destructive);
    drop_phase(&mut plan, diff);
    create_phase(&mut plan, diff);
    plan.finish()
}

struct Plan {
    statements: Vec<String>,
    warnings: Vec<Warning>,
    include_destructive: bool,
}

impl Plan {
    fn new(include_destructive: bool) -> Self {
        Self { statements: Vec::new(), warnings: Vec::new(), include_destructive }
    }

    fn push(&mut self, statement: String) {
        self.statements.push(statement);
    }

    fn destructive(&mut self, statement: String, description: String) {
        self.warnings.push(Warning { description });
        if self.include_destructive {
            self.statements.push(statement);
        }
    }

    /// Several statements that only make sense together (e.g. drop + recreate
    /// of an enum), gated as one destructive unit.
    fn destructive_group(&mut self, statements: Vec<String>, description: String) {
        self.warnings.push(Warning { description });
        if self.include_destructive {
            self.statements.extend(statements);
        }
    }

    fn finish(self) -> MigrationPlan {
        MigrationPlan { statements: self.statements, warnings: self.warnings }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// --- drop pass -------------------------------------------------------------

fn drop_phase(plan: &mut Plan, diff: &SchemaDiff) {
    // Triggers go first: they depend on both tables and functions.
    for trigger in diff.triggers.removed.values() {
        plan.push(format!("DROP TRIGGER {} ON {};", quote(&trigger.name), quote(&trigger.table)));
    }
    for change in diff.triggers.modified.values() {
        plan.push(format!(
            "DROP TRIGGER {} ON {};",
            quote(&change.before.name),
            quote(&change.before.table)
        ));
    }

    // Policies and grants before the tables they attach to.
    for policy in diff.policies.removed.values() {
        plan.push(format!("DROP POLICY {} ON {};", quote(&policy.name), quote(&policy.table)));
    }
    for change in diff.policies.modified.values() {
        plan.push(format!(
            "DROP POLICY {} ON {};",
            quote(&change.before.name),
            quote(&change.before.table)
        ));
    }
    for privilege in diff.privileges.removed.values() {
        plan.push(revoke(privilege, &privilege.privileges));
    }
    for change in diff.privileges.modified.values() {
        let lost: Vec<String> = change
            .before
            .privileges
            .iter()
            .filter(|p| !change.after.privileges.contains(p))
            .cloned()
            .collect();
        if !lost.is_empty() {
            plan.push(revoke(&change.before, &lost));
        }
    }

    // Views and materialized views depend on tables and columns.
    for view in diff.views.removed.values() {
        plan.push(format!("DROP VIEW {};", quote(&view.name)));
    }
    for matview in diff.materialized_views.removed.values() {
        plan.push(format!("DROP MATERIALIZED VIEW {};", quote(&matview.name)));
    }
    // Materialized views cannot be redefined in place; recreated later.
    for change in diff.materialized_views.modified.values() {
        plan.push(format!("DROP MATERIALIZED VIEW {};", quote(&change.before.name)));
    }

    // Foreign keys before any other constraint, index or column drops.
    for (table, change) in &diff.tables.modified {
        for constraint in change.constraints.removed.values() {
            if constraint.kind.is_foreign_key() {
                drop_constraint(plan, table, constraint);
            }
        }
        for replaced in change.constraints.modified.values() {
            if replaced.before.kind.is_foreign_key() {
                drop_constraint(plan, table, &replaced.before);
            }
        }
    }
    for (table, change) in &diff.tables.modified {
        for index in change.indexes.removed.values() {
            plan.push(format!("DROP INDEX {};", quote(&index.name)));
        }
        for replaced in change.indexes.modified.values() {
            plan.push(format!("DROP INDEX {};", quote(&replaced.before.name)));
        }
        for constraint in change.constraints.removed.values() {
            if !constraint.kind.is_foreign_key() {
                drop_constraint(plan, table, constraint);
            }
        }
        for replaced in change.constraints.modified.values() {
            if !replaced.before.kind.is_foreign_key() {
                drop_constraint(plan, table, &replaced.before);
            }
        }
        for column in change.columns.removed.values() {
            plan.destructive(
                format!("ALTER TABLE {} DROP COLUMN {};", quote(table), quote(&column.name)),
                format!("drop column {}.{} (data will be lost)", table, column.name),
            );
        }
    }

    // A foreign key between two removed tables would make the name-ordered
    // drops fail at apply time, so those are severed before any table goes.
    // Gated with the table drops themselves; the table warnings cover it.
    for table in diff.tables.removed.values() {
        for constraint in &table.constraints {
            if let ConstraintKind::ForeignKey { references_table, .. } = &constraint.kind {
                if references_table != &table.name
                    && diff.tables.removed.contains_key(references_table)
                    && plan.include_destructive
                {
                    plan.push(format!(
                        "ALTER TABLE {} DROP CONSTRAINT {};",
                        quote(&table.name),
                        quote(&constraint.name)
                    ));
                }
            }
        }
    }
    for table in diff.tables.removed.values() {
        plan.destructive(
            format!("DROP TABLE {};", quote(&table.name)),
            format!("drop table {} (data will be lost)", table.name),
        );
    }

    // Leaf objects last: nothing in the diff depends on them anymore.
    for function in diff.functions.removed.values() {
        plan.push(format!(
            "DROP FUNCTION {}({});",
            quote(&function.name),
            function.identity_args
        ));
    }
    for domain in diff.domains.removed.values() {
        plan.push(format!("DROP DOMAIN {};", quote(&domain.name)));
    }
    for sequence in diff.sequences.removed.values() {
        plan.push(format!("DROP SEQUENCE {};", quote(&sequence.name)));
    }
    for e in diff.enums.removed.values() {
        plan.push(format!("DROP TYPE {};", quote(&e.name)));
    }
    for collation in diff.collations.removed.values() {
        plan.push(format!("DROP COLLATION {};", quote(&collation.name)));
    }
    for extension in diff.extensions.removed.values() {
        plan.push(format!("DROP EXTENSION {};", quote(&extension.name)));
    }
}

fn drop_constraint(plan: &mut Plan, table: &str, constraint: &ConstraintDescriptor) {
    plan.destructive(
        format!("ALTER TABLE {} DROP CONSTRAINT {};", quote(table), quote(&constraint.name)),
        format!("drop constraint {} on {}", constraint.name, table),
    );
}

// --- create pass -----------------------------------------------------------

fn create_phase(plan: &mut Plan, diff: &SchemaDiff) {
    for extension in diff.extensions.added.values() {
        plan.push(format!("CREATE EXTENSION IF NOT EXISTS {};", quote(&extension.name)));
    }
    for collation in diff.collations.added.values() {
        let locale = collation
            .lc_collate
            .as_deref()
            .unwrap_or("und");
        plan.push(format!(
            "CREATE COLLATION {} (provider = {}, locale = '{}');",
            quote(&collation.name),
            collation.provider,
            locale
        ));
    }

    for e in diff.enums.added.values() {
        plan.push(create_enum(e));
    }
    for change in diff.enums.modified.values() {
        alter_enum(plan, change);
    }

    for domain in diff.domains.added.values() {
        plan.push(create_domain(domain));
    }
    for change in diff.domains.modified.values() {
        plan.push(format!("DROP DOMAIN {};", quote(&change.before.name)));
        plan.push(create_domain(&change.after));
    }

    for sequence in diff.sequences.added.values() {
        plan.push(format!(
            "CREATE SEQUENCE {} AS {} INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {}{};",
            quote(&sequence.name),
            sequence.data_type,
            sequence.increment,
            sequence.min_value,
            sequence.max_value,
            sequence.start_value,
            if sequence.cycle { " CYCLE" } else { "" }
        ));
    }
    for change in diff.sequences.modified.values() {
        let s = &change.after;
        plan.push(format!(
            "ALTER SEQUENCE {} INCREMENT BY {} MINVALUE {} MAXVALUE {}{};",
            quote(&s.name),
            s.increment,
            s.min_value,
            s.max_value,
            if s.cycle { " CYCLE" } else { " NO CYCLE" }
        ));
    }

    // Tables without their foreign keys; FKs come after every table exists.
    for table in diff.tables.added.values() {
        plan.push(create_table(table));
        for index in &table.indexes {
            plan.push(create_index(&table.name, index));
        }
    }

    for (table, change) in &diff.tables.modified {
        alter_table(plan, table, change);
    }

    for table in diff.tables.added.values() {
        for constraint in &table.constraints {
            if constraint.kind.is_foreign_key() {
                plan.push(add_constraint(&table.name, constraint));
            }
        }
    }
    for (table, change) in &diff.tables.modified {
        for constraint in change.constraints.added.values() {
            if constraint.kind.is_foreign_key() {
                plan.push(add_constraint(table, constraint));
            }
        }
        for replaced in change.constraints.modified.values() {
            if replaced.after.kind.is_foreign_key() {
                plan.push(add_constraint(table, &replaced.after));
            }
        }
    }

    for view in diff.views.added.values() {
        plan.push(format!("CREATE OR REPLACE VIEW {} AS\n{}", quote(&view.name), terminated(&view.definition)));
    }
    for change in diff.views.modified.values() {
        plan.push(format!(
            "CREATE OR REPLACE VIEW {} AS\n{}",
            quote(&change.after.name),
            terminated(&change.after.definition)
        ));
    }
    for matview in diff.materialized_views.added.values() {
        plan.push(format!(
            "CREATE MATERIALIZED VIEW {} AS\n{}",
            quote(&matview.name),
            terminated(&matview.definition)
        ));
    }
    for change in diff.materialized_views.modified.values() {
        plan.push(format!(
            "CREATE MATERIALIZED VIEW {} AS\n{}",
            quote(&change.after.name),
            terminated(&change.after.definition)
        ));
    }

    // Function definitions are full CREATE OR REPLACE statements already.
    for function in diff.functions.added.values() {
        plan.push(terminated(&function.definition));
    }
    for change in diff.functions.modified.values() {
        plan.push(terminated(&change.after.definition));
    }
    for trigger in diff.triggers.added.values() {
        plan.push(terminated(&trigger.definition));
    }
    for change in diff.triggers.modified.values() {
        plan.push(terminated(&change.after.definition));
    }

    // RLS toggles, then policies, then grants.
    for table in diff.tables.added.values() {
        if table.rls_enabled {
            plan.push(format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY;", quote(&table.name)));
        }
    }
    for (table, change) in &diff.tables.modified {
        if let Some(enabled) = change.rls_enabled {
            let verb = if enabled { "ENABLE" } else { "DISABLE" };
            plan.push(format!("ALTER TABLE {} {} ROW LEVEL SECURITY;", quote(table), verb));
        }
    }
    for policy in diff.policies.added.values() {
        plan.push(create_policy(policy));
    }
    for change in diff.policies.modified.values() {
        plan.push(create_policy(&change.after));
    }
    for privilege in diff.privileges.added.values() {
        plan.push(grant(privilege, &privilege.privileges));
    }
    for change in diff.privileges.modified.values() {
        let gained: Vec<String> = change
            .after
            .privileges
            .iter()
            .filter(|p| !change.before.privileges.contains(p))
            .cloned()
            .collect();
        if !gained.is_empty() {
            plan.push(grant(&change.after, &gained));
        }
    }
}

fn alter_table(plan: &mut Plan, table: &str, change: &TableChange) {
    for column in change.columns.added.values() {
        plan.push(format!("ALTER TABLE {} ADD COLUMN {};", quote(table), column_def(column)));
    }
    for column_change in change.columns.modified.values() {
        let before = &column_change.before;
        let after = &column_change.after;
        let type_changed = column_change.changed(ColumnProperty::Type)
            || column_change.changed(ColumnProperty::MaxLength)
            || column_change.changed(ColumnProperty::Precision)
            || column_change.changed(ColumnProperty::Scale);
        if type_changed {
            let statement = format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {};",
                quote(table),
                quote(&after.name),
                after.sql_type()
            );
            if is_narrowing(before, after) {
                plan.destructive(
                    statement,
                    format!(
                        "narrowing type change on {}.{} ({} -> {})",
                        table,
                        after.name,
                        before.sql_type(),
                        after.sql_type()
                    ),
                );
            } else {
                plan.push(statement);
            }
        }
        if column_change.changed(ColumnProperty::Nullable) {
            let verb = if after.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            plan.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {};",
                quote(table),
                quote(&after.name),
                verb
            ));
        }
        if column_change.changed(ColumnProperty::Default) {
            match &after.default {
                Some(expr) => plan.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                    quote(table),
                    quote(&after.name),
                    expr
                )),
                None => plan.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                    quote(table),
                    quote(&after.name)
                )),
            }
        }
    }
    for constraint in change.constraints.added.values() {
        if !constraint.kind.is_foreign_key() {
            plan.push(add_constraint(table, constraint));
        }
    }
    for replaced in change.constraints.modified.values() {
        if !replaced.after.kind.is_foreign_key() {
            plan.push(add_constraint(table, &replaced.after));
        }
    }
    for index in change.indexes.added.values() {
        plan.push(create_index(table, index));
    }
    for replaced in change.indexes.modified.values() {
        plan.push(create_index(table, &replaced.after));
    }
}

// --- SQL rendering ---------------------------------------------------------

fn column_def(column: &ColumnDescriptor) -> String {
    let mut def = format!("{} {}", quote(&column.name), column.sql_type());
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(expr) = &column.default {
        def.push_str(" DEFAULT ");
        def.push_str(expr);
    }
    def
}

fn create_table(table: &TableDescriptor) -> String {
    let mut lines: Vec<String> = table.columns.iter().map(column_def).collect();
    for constraint in &table.constraints {
        if !constraint.kind.is_foreign_key() {
            lines.push(constraint_def(constraint));
        }
    }
    format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote(&table.name),
        lines.join(",\n    ")
    )
}

fn constraint_def(constraint: &ConstraintDescriptor) -> String {
    let body = match &constraint.kind {
        ConstraintKind::PrimaryKey { columns } => {
            format!("PRIMARY KEY ({})", quote_list(columns))
        }
        ConstraintKind::Unique { columns } => format!("UNIQUE ({})", quote_list(columns)),
        ConstraintKind::Check { expression } => format!("CHECK {}", expression),
        ConstraintKind::ForeignKey {
            columns,
            references_table,
            references_columns,
            on_delete,
            on_update,
        } => {
            let mut fk = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_list(columns),
                quote(references_table),
                quote_list(references_columns)
            );
            if *on_delete != ForeignKeyAction::NoAction {
                fk.push_str(" ON DELETE ");
                fk.push_str(on_delete.as_sql());
            }
            if *on_update != ForeignKeyAction::NoAction {
                fk.push_str(" ON UPDATE ");
                fk.push_str(on_update.as_sql());
            }
            fk
        }
    };
    format!("CONSTRAINT {} {}", quote(&constraint.name), body)
}

fn add_constraint(table: &str, constraint: &ConstraintDescriptor) -> String {
    format!("ALTER TABLE {} ADD {};", quote(table), constraint_def(constraint))
}

fn create_index(table: &str, index: &IndexDescriptor) -> String {
    format!(
        "CREATE {}INDEX {} ON {} USING {} ({});",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name),
        quote(table),
        index.method,
        quote_list(&index.columns)
    )
}

fn create_enum(e: &EnumDescriptor) -> String {
    let values: Vec<String> = e.values.iter().map(|v| format!("'{}'", v.replace('\'', "''"))).collect();
    format!("CREATE TYPE {} AS ENUM ({});", quote(&e.name), values.join(", "))
}

fn alter_enum(plan: &mut Plan, change: &Replaced<EnumDescriptor>) {
    let removed: Vec<&String> = change
        .before
        .values
        .iter()
        .filter(|v| !change.after.values.contains(v))
        .collect();
    if removed.is_empty() {
        for value in &change.after.values {
            if !change.before.values.contains(value) {
                plan.push(format!(
                    "ALTER TYPE {} ADD VALUE IF NOT EXISTS '{}';",
                    quote(&change.after.name),
                    value.replace('\'', "''")
                ));
            }
        }
    } else {
        // Postgres cannot remove enum values in place.
        plan.destructive_group(
            vec![
                format!("DROP TYPE {};", quote(&change.before.name)),
                create_enum(&change.after),
            ],
            format!(
                "enum {} removes value(s) {} (requires drop and recreate)",
                change.before.name,
                removed.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
            ),
        );
    }
}

fn create_domain(domain: &crate::model::DomainDescriptor) -> String {
    let mut sql = format!("CREATE DOMAIN {} AS {}", quote(&domain.name), domain.data_type);
    if let Some(expr) = &domain.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(expr);
    }
    sql.push(';');
    sql
}

fn create_policy(policy: &PolicyDescriptor) -> String {
    let mut sql = format!("CREATE POLICY {} ON {}", quote(&policy.name), quote(&policy.table));
    if !policy.permissive {
        sql.push_str(" AS RESTRICTIVE");
    }
    sql.push_str(" FOR ");
    sql.push_str(&policy.command);
    if !policy.roles.is_empty() {
        sql.push_str(" TO ");
        sql.push_str(&policy.roles.join(", "));
    }
    if let Some(expr) = &policy.using_expr {
        sql.push_str(" USING ");
        sql.push_str(&parenthesized(expr));
    }
    if let Some(expr) = &policy.check_expr {
        sql.push_str(" WITH CHECK ");
        sql.push_str(&parenthesized(expr));
    }
    sql.push(';');
    sql
}

fn grant(privilege: &PrivilegeDescriptor, kinds: &[String]) -> String {
    format!(
        "GRANT {} ON {} TO {};",
        kinds.join(", "),
        quote(&privilege.table),
        quote(&privilege.grantee)
    )
}

fn revoke(privilege: &PrivilegeDescriptor, kinds: &[String]) -> String {
    format!(
        "REVOKE {} ON {} FROM {};",
        kinds.join(", "),
        quote(&privilege.table),
        quote(&privilege.grantee)
    )
}

fn quote_list(names: &[String]) -> String {
    names.iter().map(|n| quote(n)).collect::<Vec<_>>().join(", ")
}

fn parenthesized(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        trimmed.to_string()
    } else {
        format!("({})", trimmed)
    }
}

fn terminated(statement: &str) -> String {
    let trimmed = statement.trim_end();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{};", trimmed)
    }
}

/// Whether changing a column from `before` to `after` can lose data.
fn is_narrowing(before: &ColumnDescriptor, after: &ColumnDescriptor) -> bool {
    if let (Some(b), Some(a)) = (before.max_length, after.max_length) {
        if a < b {
            return true;
        }
    }
    if before.max_length.is_none() && after.max_length.is_some() {
        return true;
    }
    if let (Some(b), Some(a)) = (before.numeric_precision, after.numeric_precision) {
        if a < b {
            return true;
        }
    }
    match (width_rank(&before.data_type), width_rank(&after.data_type)) {
        (Some((bf, br)), Some((af, ar))) => {
            if bf == af {
                ar < br
            } else {
                // Cross-family change out of a text type loses formatting at
                // minimum and fails outright on non-castable rows.
                bf == TEXT_FAMILY
            }
        }
        _ => false,
    }
}

const TEXT_FAMILY: u8 = 2;

fn width_rank(data_type: &str) -> Option<(u8, u8)> {
    match data_type {
        "smallint" => Some((0, 1)),
        "integer" => Some((0, 2)),
        "bigint" => Some((0, 3)),
        "numeric" | "decimal" => Some((0, 4)),
        "real" => Some((1, 1)),
        "double precision" => Some((1, 2)),
        "character" => Some((TEXT_FAMILY, 1)),
        "character varying" => Some((TEXT_FAMILY, 2)),
        "text" => Some((TEXT_FAMILY, 3)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::model::{SchemaModel, TableDescriptor};

    fn table(name: &str, columns: Vec<ColumnDescriptor>) -> TableDescriptor {
        TableDescriptor { columns, ..TableDescriptor::new(name) }
    }

    fn model_with(tables: Vec<TableDescriptor>) -> SchemaModel {
        let mut model = SchemaModel::empty("app");
        for t in tables {
            model.tables.insert(t.name.clone(), t);
        }
        model
    }

    fn plan_between(base: &SchemaModel, target: &SchemaModel, destructive: bool) -> MigrationPlan {
        generate(&diff(base, target), &GenerateOptions { include_destructive: destructive })
    }

    #[test]
    fn empty_diff_yields_empty_plan() {
        let model = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);
        let plan = plan_between(&model, &model, true);
        assert!(plan.statements.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn new_table_renders_create_with_inline_primary_key() {
        let mut tickets = table(
            "tickets",
            vec![
                ColumnDescriptor::new("id", "integer")
                    .not_null()
                    .default_expr("nextval('tickets_id_seq'::regclass)"),
                ColumnDescriptor::new("title", "character varying").length(255),
            ],
        );
        tickets.constraints.push(ConstraintDescriptor {
            name: "tickets_pkey".into(),
            kind: ConstraintKind::PrimaryKey { columns: vec!["id".into()] },
        });

        let plan = plan_between(&SchemaModel::empty("app"), &model_with(vec![tickets]), true);
        assert_eq!(plan.statements.len(), 1);
        let sql = &plan.statements[0];
        assert!(sql.starts_with("CREATE TABLE \"tickets\""));
        assert!(sql.contains("\"title\" character varying(255)"));
        assert!(sql.contains("CONSTRAINT \"tickets_pkey\" PRIMARY KEY (\"id\")"));
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn foreign_keys_come_after_all_tables() {
        let mut comments = table(
            "comments",
            vec![
                ColumnDescriptor::new("id", "integer").not_null(),
                ColumnDescriptor::new("ticket_id", "integer").not_null(),
            ],
        );
        comments.constraints.push(ConstraintDescriptor {
            name: "comments_ticket_id_fkey".into(),
            kind: ConstraintKind::ForeignKey {
                columns: vec!["ticket_id".into()],
                references_table: "tickets".into(),
                references_columns: vec!["id".into()],
                on_delete: ForeignKeyAction::Cascade,
                on_update: ForeignKeyAction::NoAction,
            },
        });
        let tickets = table("tickets", vec![ColumnDescriptor::new("id", "integer").not_null()]);

        let plan =
            plan_between(&SchemaModel::empty("app"), &model_with(vec![comments, tickets]), true);
        let creates: Vec<usize> = plan
            .statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.starts_with("CREATE TABLE"))
            .map(|(i, _)| i)
            .collect();
        let fk = plan
            .statements
            .iter()
            .position(|s| s.contains("FOREIGN KEY"))
            .expect("fk statement present");
        assert_eq!(creates.len(), 2);
        assert!(fk > *creates.iter().max().unwrap());
        assert!(plan.statements[fk].contains("ON DELETE CASCADE"));
    }

    #[test]
    fn dropped_column_warns_and_is_gated() {
        let base = model_with(vec![table(
            "tickets",
            vec![
                ColumnDescriptor::new("id", "integer").not_null(),
                ColumnDescriptor::new("title", "text"),
            ],
        )]);
        let target = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);

        let without = plan_between(&base, &target, false);
        assert!(without.statements.is_empty());
        assert_eq!(without.warnings.len(), 1);
        assert!(without.warnings[0].description.contains("tickets.title"));

        let with = plan_between(&base, &target, true);
        assert_eq!(with.statements, vec!["ALTER TABLE \"tickets\" DROP COLUMN \"title\";"]);
        // The warning still accompanies the included statement.
        assert_eq!(with.warnings, without.warnings);
    }

    #[test]
    fn removed_tables_sever_cross_fks_before_dropping() {
        let parent = table("a", vec![ColumnDescriptor::new("id", "integer").not_null()]);
        let mut child = table("b", vec![ColumnDescriptor::new("a_id", "integer")]);
        child.constraints.push(ConstraintDescriptor {
            name: "b_a_id_fkey".into(),
            kind: ConstraintKind::ForeignKey {
                columns: vec!["a_id".into()],
                references_table: "a".into(),
                references_columns: vec!["id".into()],
                on_delete: ForeignKeyAction::NoAction,
                on_update: ForeignKeyAction::NoAction,
            },
        });
        let base = model_with(vec![parent, child]);

        // "a" sorts before "b"; without the constraint drop, DROP TABLE "a"
        // would fail while b_a_id_fkey still references it.
        let plan = plan_between(&base, &SchemaModel::empty("app"), true);
        assert_eq!(
            plan.statements,
            vec![
                "ALTER TABLE \"b\" DROP CONSTRAINT \"b_a_id_fkey\";",
                "DROP TABLE \"a\";",
                "DROP TABLE \"b\";",
            ]
        );
        assert_eq!(plan.warnings.len(), 2);

        let gated = plan_between(&base, &SchemaModel::empty("app"), false);
        assert!(gated.statements.is_empty());
        assert_eq!(gated.warnings.len(), 2);
    }

    #[test]
    fn drops_precede_creates() {
        let base = model_with(vec![table(
            "legacy",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);
        let target = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);

        let plan = plan_between(&base, &target, true);
        let drop = plan.statements.iter().position(|s| s.starts_with("DROP TABLE")).unwrap();
        let create = plan.statements.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        assert!(drop < create);
    }

    #[test]
    fn widening_type_change_is_not_destructive() {
        let base = model_with(vec![table("t", vec![ColumnDescriptor::new("n", "integer")])]);
        let target = model_with(vec![table("t", vec![ColumnDescriptor::new("n", "bigint")])]);
        let plan = plan_between(&base, &target, false);
        assert_eq!(plan.statements, vec!["ALTER TABLE \"t\" ALTER COLUMN \"n\" TYPE bigint;"]);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn narrowing_type_change_warns() {
        let base = model_with(vec![table("t", vec![ColumnDescriptor::new("n", "bigint")])]);
        let target = model_with(vec![table("t", vec![ColumnDescriptor::new("n", "integer")])]);
        let plan = plan_between(&base, &target, false);
        assert!(plan.statements.is_empty());
        assert!(plan.warnings[0].description.contains("narrowing"));
    }

    #[test]
    fn shrinking_varchar_length_is_narrowing() {
        let base = model_with(vec![table(
            "t",
            vec![ColumnDescriptor::new("s", "character varying").length(255)],
        )]);
        let target = model_with(vec![table(
            "t",
            vec![ColumnDescriptor::new("s", "character varying").length(80)],
        )]);
        let plan = plan_between(&base, &target, true);
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(
            plan.statements,
            vec!["ALTER TABLE \"t\" ALTER COLUMN \"s\" TYPE character varying(80);"]
        );
    }

    #[test]
    fn nullability_and_default_changes_render_alters() {
        let base = model_with(vec![table("t", vec![ColumnDescriptor::new("s", "text")])]);
        let target = model_with(vec![table(
            "t",
            vec![ColumnDescriptor::new("s", "text").not_null().default_expr("''::text")],
        )]);
        let plan = plan_between(&base, &target, false);
        assert_eq!(
            plan.statements,
            vec![
                "ALTER TABLE \"t\" ALTER COLUMN \"s\" SET NOT NULL;",
                "ALTER TABLE \"t\" ALTER COLUMN \"s\" SET DEFAULT ''::text;",
            ]
        );
    }

    #[test]
    fn enum_gains_value_with_alter_type() {
        let mut base = SchemaModel::empty("app");
        base.enums.insert(
            "ticket_status".into(),
            EnumDescriptor { name: "ticket_status".into(), values: vec!["open".into()] },
        );
        let mut target = base.clone();
        target.enums.get_mut("ticket_status").unwrap().values.push("closed".into());

        let plan = plan_between(&base, &target, false);
        assert_eq!(
            plan.statements,
            vec!["ALTER TYPE \"ticket_status\" ADD VALUE IF NOT EXISTS 'closed';"]
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn enum_value_removal_is_destructive_group() {
        let mut base = SchemaModel::empty("app");
        base.enums.insert(
            "ticket_status".into(),
            EnumDescriptor {
                name: "ticket_status".into(),
                values: vec!["open".into(), "closed".into()],
            },
        );
        let mut target = base.clone();
        target.enums.get_mut("ticket_status").unwrap().values.pop();

        let without = plan_between(&base, &target, false);
        assert!(without.statements.is_empty());
        assert_eq!(without.warnings.len(), 1);

        let with = plan_between(&base, &target, true);
        assert_eq!(with.statements.len(), 2);
        assert!(with.statements[0].starts_with("DROP TYPE"));
        assert!(with.statements[1].starts_with("CREATE TYPE"));
    }

    #[test]
    fn rls_and_policies_render_after_table_creation() {
        let mut tickets = table("tickets", vec![ColumnDescriptor::new("id", "integer")]);
        tickets.rls_enabled = true;
        let policy = PolicyDescriptor {
            name: "tenant_isolation".into(),
            table: "tickets".into(),
            permissive: false,
            command: "SELECT".into(),
            roles: vec!["app_user".into()],
            using_expr: Some("tenant_id = 1".into()),
            check_expr: None,
        };
        tickets.policies.push(policy.clone());
        let mut target = model_with(vec![tickets]);
        target.policies.insert(policy.key(), policy);

        let plan = plan_between(&SchemaModel::empty("app"), &target, true);
        let create = plan.statements.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        let enable = plan
            .statements
            .iter()
            .position(|s| s.contains("ENABLE ROW LEVEL SECURITY"))
            .unwrap();
        let policy_pos = plan.statements.iter().position(|s| s.starts_with("CREATE POLICY")).unwrap();
        assert!(create < enable && enable < policy_pos);
        assert!(plan.statements[policy_pos].contains("AS RESTRICTIVE"));
        assert!(plan.statements[policy_pos].contains("FOR SELECT"));
        assert!(plan.statements[policy_pos].contains("TO app_user"));
        assert!(plan.statements[policy_pos].contains("USING (tenant_id = 1)"));
    }

    #[test]
    fn privilege_modification_grants_and_revokes_the_delta() {
        let mut base = SchemaModel::empty("app");
        base.privileges.insert(
            "app_user@tickets".into(),
            PrivilegeDescriptor {
                grantee: "app_user".into(),
                table: "tickets".into(),
                privileges: vec!["DELETE".into(), "SELECT".into()],
            },
        );
        let mut target = base.clone();
        target.privileges.get_mut("app_user@tickets").unwrap().privileges =
            vec!["INSERT".into(), "SELECT".into()];

        let plan = plan_between(&base, &target, true);
        assert_eq!(
            plan.statements,
            vec![
                "REVOKE DELETE ON \"tickets\" FROM \"app_user\";",
                "GRANT INSERT ON \"tickets\" TO \"app_user\";",
            ]
        );
    }
}
