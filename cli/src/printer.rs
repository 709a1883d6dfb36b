//! Human-readable diff report.
//!
//! Prints one line per changed object: green `+` for additions, red `-` for
//! removals, yellow `~` for modifications, grouped by category with tables
//! expanded down to the column level.

use colored::*;
use nubase_pg::SchemaDiff;
use nubase_pg::diff::{ColumnProperty, SetDiff, TableChange};
use nubase_pg::generate::Warning;

pub fn print_diff(diff: &SchemaDiff) {
    if !diff.has_differences() {
        println!("{} Schema is up to date", "✓".green());
        return;
    }

    print_tables(&diff.tables);
    print_category("enums", &diff.enums);
    print_category("sequences", &diff.sequences);
    print_category("views", &diff.views);
    print_category("materialized views", &diff.materialized_views);
    print_category("functions", &diff.functions);
    print_category("triggers", &diff.triggers);
    print_category("extensions", &diff.extensions);
    print_category("domains", &diff.domains);
    print_category("collations", &diff.collations);
    print_category("policies", &diff.policies);
    print_category("privileges", &diff.privileges);
}

pub fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("{}", "⚠ Destructive changes detected:".yellow().bold());
    for warning in warnings {
        println!("  {} {}", "!".yellow(), warning.description);
    }
}

fn print_tables(tables: &SetDiff<nubase_pg::model::TableDescriptor, TableChange>) {
    if tables.is_empty() {
        return;
    }
    println!("{}", "tables".bold());
    for (name, table) in &tables.added {
        println!("  {} {}", "+".green(), name.green());
        for column in &table.columns {
            println!("      {} {}", column.name, column.sql_type().dimmed());
        }
    }
    for name in tables.removed.keys() {
        println!("  {} {}", "-".red(), name.red());
    }
    for (name, change) in &tables.modified {
        println!("  {} {}", "~".yellow(), name.yellow());
        for (column, descriptor) in &change.columns.added {
            println!("      {} {} {}", "+".green(), column, descriptor.sql_type().dimmed());
        }
        for column in change.columns.removed.keys() {
            println!("      {} {}", "-".red(), column);
        }
        for (column, changed) in &change.columns.modified {
            let properties: Vec<&str> =
                changed.changed_properties.iter().map(|p| property_label(*p)).collect();
            println!("      {} {} ({})", "~".yellow(), column, properties.join(", ").dimmed());
        }
        print_nested("constraint", &change.constraints);
        print_nested("index", &change.indexes);
        print_nested("policy", &change.policies);
        // Policy-only changes set rls_changed without flipping the flag;
        // the policy lines above already show those.
        if let Some(state) = rls_state(change) {
            println!("      {} row level security {}", "~".yellow(), state);
        }
    }
    println!();
}

fn rls_state(change: &TableChange) -> Option<&'static str> {
    change.rls_enabled.map(|enabled| if enabled { "enabled" } else { "disabled" })
}

fn property_label(property: ColumnProperty) -> &'static str {
    match property {
        ColumnProperty::Type => "type",
        ColumnProperty::Nullable => "nullable",
        ColumnProperty::Default => "default",
        ColumnProperty::MaxLength => "length",
        ColumnProperty::Precision => "precision",
        ColumnProperty::Scale => "scale",
    }
}

fn print_nested<T, M>(kind: &str, diff: &SetDiff<T, M>) {
    for name in diff.added.keys() {
        println!("      {} {} {}", "+".green(), kind, name);
    }
    for name in diff.removed.keys() {
        println!("      {} {} {}", "-".red(), kind, name);
    }
    for name in diff.modified.keys() {
        println!("      {} {} {}", "~".yellow(), kind, name);
    }
}

fn print_category<T, M>(label: &str, diff: &SetDiff<T, M>) {
    if diff.is_empty() {
        return;
    }
    println!("{}", label.bold());
    for name in diff.added.keys() {
        println!("  {} {}", "+".green(), name.green());
    }
    for name in diff.removed.keys() {
        println!("  {} {}", "-".red(), name.red());
    }
    for name in diff.modified.keys() {
        println!("  {} {}", "~".yellow(), name.yellow());
    }
    println!();
}
