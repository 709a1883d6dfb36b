//! Structural diff between two schema snapshots.
//!
//! `diff(base, target)` is a pure function: names present only in `target`
//! are added, names present only in `base` are removed, names present in
//! both are compared field by field. Snapshot metadata (server version,
//! database name, extraction time) never participates in the comparison.
//!
//! Renames are deliberately not detected: a renamed table or column surfaces
//! as one removal plus one addition, and the generator flags the destructive
//! half of that pair.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    ColumnDescriptor, ConstraintDescriptor, EnumDescriptor, ExtensionDescriptor,
    FunctionDescriptor, IndexDescriptor, MaterializedViewDescriptor, PolicyDescriptor,
    PrivilegeDescriptor, SchemaModel, SequenceDescriptor, TableDescriptor, TriggerDescriptor,
    ViewDescriptor,
};
use crate::model::{CollationDescriptor, DomainDescriptor};

/// Before/after pair for a modified object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replaced<T> {
    pub before: T,
    pub after: T,
}

/// Added/removed/modified sets for one object category. An object name
/// appears in at most one of the three maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetDiff<T, M> {
    pub added: BTreeMap<String, T>,
    pub removed: BTreeMap<String, T>,
    pub modified: BTreeMap<String, M>,
}

impl<T, M> SetDiff<T, M> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

impl<T, M> Default for SetDiff<T, M> {
    fn default() -> Self {
        Self {
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
            modified: BTreeMap::new(),
        }
    }
}

/// Column properties the differ compares, in declaration order. The order
/// of `changed_properties` always follows this declaration order, not the
/// order in which differences were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnProperty {
    Type,
    Nullable,
    Default,
    MaxLength,
    Precision,
    Scale,
}

/// A modified column with the exact set of properties that differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChange {
    pub before: ColumnDescriptor,
    pub after: ColumnDescriptor,
    pub changed_properties: Vec<ColumnProperty>,
}

impl ColumnChange {
    pub fn changed(&self, property: ColumnProperty) -> bool {
        self.changed_properties.contains(&property)
    }
}

/// Nested diff for a table present in both snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableChange {
    pub columns: SetDiff<ColumnDescriptor, ColumnChange>,
    pub constraints: SetDiff<ConstraintDescriptor, Replaced<ConstraintDescriptor>>,
    pub indexes: SetDiff<IndexDescriptor, Replaced<IndexDescriptor>>,
    pub policies: SetDiff<PolicyDescriptor, Replaced<PolicyDescriptor>>,
    /// True when the RLS flag flipped or the attached policy set changed.
    pub rls_changed: bool,
    /// The new RLS flag, present only when the flag itself flipped.
    pub rls_enabled: Option<bool>,
}

impl TableChange {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.constraints.is_empty()
            && self.indexes.is_empty()
            && self.policies.is_empty()
            && !self.rls_changed
    }
}

/// Result of comparing two schema models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDiff {
    pub tables: SetDiff<TableDescriptor, TableChange>,
    pub enums: SetDiff<EnumDescriptor, Replaced<EnumDescriptor>>,
    pub sequences: SetDiff<SequenceDescriptor, Replaced<SequenceDescriptor>>,
    pub views: SetDiff<ViewDescriptor, Replaced<ViewDescriptor>>,
    pub materialized_views: SetDiff<MaterializedViewDescriptor, Replaced<MaterializedViewDescriptor>>,
    pub functions: SetDiff<FunctionDescriptor, Replaced<FunctionDescriptor>>,
    pub triggers: SetDiff<TriggerDescriptor, Replaced<TriggerDescriptor>>,
    pub extensions: SetDiff<ExtensionDescriptor, Replaced<ExtensionDescriptor>>,
    pub domains: SetDiff<DomainDescriptor, Replaced<DomainDescriptor>>,
    pub collations: SetDiff<CollationDescriptor, Replaced<CollationDescriptor>>,
    pub policies: SetDiff<PolicyDescriptor, Replaced<PolicyDescriptor>>,
    pub privileges: SetDiff<PrivilegeDescriptor, Replaced<PrivilegeDescriptor>>,
}

impl SchemaDiff {
    pub fn has_differences(&self) -> bool {
        !(self.tables.is_empty()
            && self.enums.is_empty()
            && self.sequences.is_empty()
            && self.views.is_empty()
            && self.materialized_views.is_empty()
            && self.functions.is_empty()
            && self.triggers.is_empty()
            && self.extensions.is_empty()
            && self.domains.is_empty()
            && self.collations.is_empty()
            && self.policies.is_empty()
            && self.privileges.is_empty())
    }
}

/// Compare two snapshots. `diff(x, x)` is always the empty diff.
pub fn diff(base: &SchemaModel, target: &SchemaModel) -> SchemaDiff {
    SchemaDiff {
        tables: diff_tables(&base.tables, &target.tables),
        enums: diff_category(&base.enums, &target.enums),
        sequences: diff_category(&base.sequences, &target.sequences),
        views: diff_category(&base.views, &target.views),
        materialized_views: diff_category(&base.materialized_views, &target.materialized_views),
        functions: diff_category(&base.functions, &target.functions),
        triggers: diff_category(&base.triggers, &target.triggers),
        extensions: diff_category(&base.extensions, &target.extensions),
        domains: diff_category(&base.domains, &target.domains),
        collations: diff_category(&base.collations, &target.collations),
        policies: diff_category(&base.policies, &target.policies),
        privileges: diff_category(&base.privileges, &target.privileges),
    }
}

fn diff_category<T: Clone + PartialEq>(
    base: &BTreeMap<String, T>,
    target: &BTreeMap<String, T>,
) -> SetDiff<T, Replaced<T>> {
    let mut out = SetDiff::default();
    for (name, after) in target {
        match base.get(name) {
            None => {
                out.added.insert(name.clone(), after.clone());
            }
            Some(before) if before != after => {
                out.modified.insert(
                    name.clone(),
                    Replaced { before: before.clone(), after: after.clone() },
                );
            }
            Some(_) => {}
        }
    }
    for (name, before) in base {
        if !target.contains_key(name) {
            out.removed.insert(name.clone(), before.clone());
        }
    }
    out
}

fn diff_tables(
    base: &BTreeMap<String, TableDescriptor>,
    target: &BTreeMap<String, TableDescriptor>,
) -> SetDiff<TableDescriptor, TableChange> {
    let mut out = SetDiff::default();
    for (name, after) in target {
        match base.get(name) {
            None => {
                out.added.insert(name.clone(), after.clone());
            }
            Some(before) => {
                let change = diff_table(before, after);
                if !change.is_empty() {
                    out.modified.insert(name.clone(), change);
                }
            }
        }
    }
    for (name, before) in base {
        if !target.contains_key(name) {
            out.removed.insert(name.clone(), before.clone());
        }
    }
    out
}

fn diff_table(base: &TableDescriptor, target: &TableDescriptor) -> TableChange {
    let policies = diff_by_name(
        &base.policies,
        &target.policies,
        |p: &PolicyDescriptor| p.name.clone(),
    );
    let rls_flag_flipped = base.rls_enabled != target.rls_enabled;
    TableChange {
        columns: diff_columns(&base.columns, &target.columns),
        constraints: diff_structural(
            &base.constraints,
            &target.constraints,
            |c: &ConstraintDescriptor| c.name.clone(),
            |a, b| a.kind == b.kind,
        ),
        indexes: diff_structural(
            &base.indexes,
            &target.indexes,
            |i: &IndexDescriptor| i.name.clone(),
            |a, b| a.columns == b.columns && a.unique == b.unique && a.method == b.method,
        ),
        rls_changed: rls_flag_flipped || !policies.is_empty(),
        rls_enabled: rls_flag_flipped.then_some(target.rls_enabled),
        policies,
    }
}

fn diff_by_name<T: Clone + PartialEq>(
    base: &[T],
    target: &[T],
    key: impl Fn(&T) -> String,
) -> SetDiff<T, Replaced<T>> {
    let base_map: BTreeMap<String, T> = base.iter().map(|v| (key(v), v.clone())).collect();
    let target_map: BTreeMap<String, T> = target.iter().map(|v| (key(v), v.clone())).collect();
    diff_category(&base_map, &target_map)
}

/// Name-keyed diff with a structural-equality pass on top: an added/removed
/// pair whose structures match is treated as a rename of a synthetic name
/// and dropped from the diff entirely.
fn diff_structural<T: Clone + PartialEq>(
    base: &[T],
    target: &[T],
    key: impl Fn(&T) -> String,
    same_structure: impl Fn(&T, &T) -> bool,
) -> SetDiff<T, Replaced<T>> {
    let mut out = diff_by_name(base, target, key);
    let mut cancelled_added = Vec::new();
    let mut cancelled_removed = Vec::new();
    for (added_name, added) in &out.added {
        let matched = out.removed.iter().find(|&(removed_name, removed)| {
            !cancelled_removed.contains(removed_name) && same_structure(added, removed)
        });
        if let Some((removed_name, _)) = matched {
            cancelled_added.push(added_name.clone());
            cancelled_removed.push(removed_name.clone());
        }
    }
    for name in cancelled_added {
        out.added.remove(&name);
    }
    for name in cancelled_removed {
        out.removed.remove(&name);
    }
    out
}

fn diff_columns(
    base: &[ColumnDescriptor],
    target: &[ColumnDescriptor],
) -> SetDiff<ColumnDescriptor, ColumnChange> {
    let mut out = SetDiff::default();
    for after in target {
        match base.iter().find(|c| c.name == after.name) {
            None => {
                out.added.insert(after.name.clone(), after.clone());
            }
            Some(before) => {
                let changed = changed_properties(before, after);
                if !changed.is_empty() {
                    out.modified.insert(
                        after.name.clone(),
                        ColumnChange {
                            before: before.clone(),
                            after: after.clone(),
                            changed_properties: changed,
                        },
                    );
                }
            }
        }
    }
    for before in base {
        if !target.iter().any(|c| c.name == before.name) {
            out.removed.insert(before.name.clone(), before.clone());
        }
    }
    out
}

fn changed_properties(before: &ColumnDescriptor, after: &ColumnDescriptor) -> Vec<ColumnProperty> {
    let mut changed = Vec::new();
    if before.data_type != after.data_type {
        changed.push(ColumnProperty::Type);
    }
    if before.nullable != after.nullable {
        changed.push(ColumnProperty::Nullable);
    }
    if before.default != after.default {
        changed.push(ColumnProperty::Default);
    }
    if before.max_length != after.max_length {
        changed.push(ColumnProperty::MaxLength);
    }
    if before.numeric_precision != after.numeric_precision {
        changed.push(ColumnProperty::Precision);
    }
    if before.numeric_scale != after.numeric_scale {
        changed.push(ColumnProperty::Scale);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintKind, ForeignKeyAction};

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

    #[test]
    fn diff_is_reflexive() {
        let model = model_with(vec![table(
            "tickets",
            vec![
                ColumnDescriptor::new("id", "integer").not_null(),
                ColumnDescriptor::new("title", "character varying").length(255),
            ],
        )]);
        let d = diff(&model, &model);
        assert!(!d.has_differences());
        assert!(d.tables.is_empty());
    }

    #[test]
    fn metadata_does_not_count_as_difference() {
        let model = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);
        let mut later = model.clone();
        later.pg_version = "17.2".into();
        later.extracted_at = chrono::Utc::now();
        assert!(!diff(&model, &later).has_differences());
    }

    #[test]
    fn one_new_table_is_additive() {
        let base = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);
        let mut target = base.clone();
        target.tables.insert(
            "comments".into(),
            table("comments", vec![ColumnDescriptor::new("id", "integer").not_null()]),
        );

        let d = diff(&base, &target);
        assert!(d.has_differences());
        assert_eq!(d.tables.added.len(), 1);
        assert!(d.tables.added.contains_key("comments"));
        assert!(d.tables.removed.is_empty());
        assert!(d.tables.modified.is_empty());
        assert!(d.enums.is_empty());
        assert!(d.views.is_empty());
        assert!(d.policies.is_empty());
    }

    #[test]
    fn added_and_removed_are_symmetric() {
        let base = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);
        let target = model_with(vec![table(
            "comments",
            vec![ColumnDescriptor::new("id", "integer").not_null()],
        )]);

        let forward = diff(&base, &target);
        let backward = diff(&target, &base);
        assert_eq!(forward.tables.added, backward.tables.removed);
        assert_eq!(forward.tables.removed, backward.tables.added);
    }

    #[test]
    fn changed_properties_follow_declaration_order() {
        let before = ColumnDescriptor::new("title", "text");
        let mut after = ColumnDescriptor::new("title", "character varying").not_null();
        after.max_length = Some(80);

        let base = model_with(vec![table("tickets", vec![before])]);
        let target = model_with(vec![table("tickets", vec![after])]);

        let d = diff(&base, &target);
        let change = &d.tables.modified["tickets"].columns.modified["title"];
        assert_eq!(
            change.changed_properties,
            vec![ColumnProperty::Type, ColumnProperty::Nullable, ColumnProperty::MaxLength]
        );
    }

    #[test]
    fn rename_surfaces_as_remove_plus_add() {
        let base = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("titel", "text")],
        )]);
        let target = model_with(vec![table(
            "tickets",
            vec![ColumnDescriptor::new("title", "text")],
        )]);

        let d = diff(&base, &target);
        let change = &d.tables.modified["tickets"];
        assert!(change.columns.added.contains_key("title"));
        assert!(change.columns.removed.contains_key("titel"));
        assert!(change.columns.modified.is_empty());
    }

    #[test]
    fn structurally_identical_constraint_rename_is_not_a_difference() {
        let fk = |name: &str| ConstraintDescriptor {
            name: name.into(),
            kind: ConstraintKind::ForeignKey {
                columns: vec!["ticket_id".into()],
                references_table: "tickets".into(),
                references_columns: vec!["id".into()],
                on_delete: ForeignKeyAction::Cascade,
                on_update: ForeignKeyAction::NoAction,
            },
        };
        let mut before = table("comments", vec![ColumnDescriptor::new("ticket_id", "integer")]);
        before.constraints.push(fk("comments_ticket_id_fkey"));
        let mut after = before.clone();
        after.constraints[0] = fk("fk_comments_tickets");

        let d = diff(&model_with(vec![before]), &model_with(vec![after]));
        assert!(!d.has_differences());
    }

    #[test]
    fn same_name_constraint_with_new_structure_is_modified() {
        let unique = |columns: Vec<&str>| ConstraintDescriptor {
            name: "tickets_title_key".into(),
            kind: ConstraintKind::Unique {
                columns: columns.into_iter().map(String::from).collect(),
            },
        };
        let mut before = table("tickets", vec![ColumnDescriptor::new("title", "text")]);
        before.constraints.push(unique(vec!["title"]));
        let mut after = before.clone();
        after.constraints[0] = unique(vec!["title", "id"]);

        let d = diff(&model_with(vec![before]), &model_with(vec![after]));
        let change = &d.tables.modified["tickets"];
        assert!(change.constraints.modified.contains_key("tickets_title_key"));
    }

    #[test]
    fn policy_change_sets_rls_flag() {
        let policy = PolicyDescriptor {
            name: "tenant_isolation".into(),
            table: "tickets".into(),
            permissive: true,
            command: "ALL".into(),
            roles: vec!["public".into()],
            using_expr: Some("(tenant_id = current_setting('app.tenant')::int)".into()),
            check_expr: None,
        };
        let before = table("tickets", vec![ColumnDescriptor::new("id", "integer")]);
        let mut after = before.clone();
        after.policies.push(policy.clone());

        let d = diff(&model_with(vec![before]), &model_with(vec![after]));
        let change = &d.tables.modified["tickets"];
        assert!(change.rls_changed);
        assert_eq!(change.rls_enabled, None);
        assert!(change.policies.added.contains_key("tenant_isolation"));
    }

    #[test]
    fn rls_flag_flip_is_recorded_with_new_value() {
        let before = table("tickets", vec![ColumnDescriptor::new("id", "integer")]);
        let mut after = before.clone();
        after.rls_enabled = true;

        let d = diff(&model_with(vec![before]), &model_with(vec![after]));
        let change = &d.tables.modified["tickets"];
        assert!(change.rls_changed);
        assert_eq!(change.rls_enabled, Some(true));
    }

    #[test]
    fn enum_value_change_lands_in_modified() {
        let mut base = SchemaModel::empty("app");
        base.enums.insert(
            "ticket_status".into(),
            EnumDescriptor {
                name: "ticket_status".into(),
                values: vec!["open".into(), "closed".into()],
            },
        );
        let mut target = base.clone();
        target.enums.get_mut("ticket_status").unwrap().values.push("archived".into());

        let d = diff(&base, &target);
        let change = &d.enums.modified["ticket_status"];
        assert_eq!(change.before.values.len(), 2);
        assert_eq!(change.after.values.len(), 3);
    }
}
