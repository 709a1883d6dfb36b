//! In-memory representation of a Postgres schema at a point in time.
//!
//! A [`SchemaModel`] is produced by the extractor or loaded from a snapshot
//! file, compared by the differ, and never mutated in place: a new snapshot
//! always replaces the previous one wholesale.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root snapshot entity. Object names are unique within each category map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaModel {
    pub pg_version: String,
    pub database_name: String,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableDescriptor>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDescriptor>,
    #[serde(default)]
    pub sequences: BTreeMap<String, SequenceDescriptor>,
    #[serde(default)]
    pub views: BTreeMap<String, ViewDescriptor>,
    #[serde(default)]
    pub materialized_views: BTreeMap<String, MaterializedViewDescriptor>,
    /// Keyed by `name(identity arguments)` so overloads stay distinct.
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionDescriptor>,
    /// Keyed by `table.trigger`.
    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerDescriptor>,
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionDescriptor>,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainDescriptor>,
    #[serde(default)]
    pub collations: BTreeMap<String, CollationDescriptor>,
    /// Keyed by `table.policy`. The same descriptors are also attached to
    /// their tables, which is what feeds the per-table RLS change flag.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyDescriptor>,
    /// Keyed by `grantee@table`.
    #[serde(default)]
    pub privileges: BTreeMap<String, PrivilegeDescriptor>,
}

impl SchemaModel {
    /// The category-wise-empty baseline used when no snapshot exists yet.
    pub fn empty(database_name: impl Into<String>) -> Self {
        Self {
            pg_version: String::new(),
            database_name: database_name.into(),
            extracted_at: Utc::now(),
            tables: BTreeMap::new(),
            enums: BTreeMap::new(),
            sequences: BTreeMap::new(),
            views: BTreeMap::new(),
            materialized_views: BTreeMap::new(),
            functions: BTreeMap::new(),
            triggers: BTreeMap::new(),
            extensions: BTreeMap::new(),
            domains: BTreeMap::new(),
            collations: BTreeMap::new(),
            policies: BTreeMap::new(),
            privileges: BTreeMap::new(),
        }
    }
}

/// One table: ordered columns, constraints, indexes, RLS state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    /// Declaration (ordinal) order. Column names are unique per table.
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDescriptor>,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
    #[serde(default)]
    pub rls_enabled: bool,
    #[serde(default)]
    pub policies: Vec<PolicyDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            rls_enabled: false,
            policies: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    /// Declared length for character types only.
    #[serde(default)]
    pub max_length: Option<i32>,
    /// Precision/scale for numeric types only.
    #[serde(default)]
    pub numeric_precision: Option<i32>,
    #[serde(default)]
    pub numeric_scale: Option<i32>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn length(mut self, len: i32) -> Self {
        self.max_length = Some(len);
        self
    }

    /// The full SQL type, with length or precision/scale applied.
    pub fn sql_type(&self) -> String {
        if let Some(len) = self.max_length {
            return format!("{}({})", self.data_type, len);
        }
        match (self.numeric_precision, self.numeric_scale) {
            (Some(p), Some(s)) => format!("{}({}, {})", self.data_type, p, s),
            (Some(p), None) => format!("{}({})", self.data_type, p),
            _ => self.data_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey {
        columns: Vec<String>,
    },
    ForeignKey {
        columns: Vec<String>,
        /// Nominal reference: the target is identified by name, never by
        /// identity, so it may point at a table created in the same diff.
        references_table: String,
        references_columns: Vec<String>,
        on_delete: ForeignKeyAction,
        on_update: ForeignKeyAction,
    },
    Unique {
        columns: Vec<String>,
    },
    Check {
        expression: String,
    },
}

impl ConstraintKind {
    pub fn is_foreign_key(&self) -> bool {
        matches!(self, ConstraintKind::ForeignKey { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Maps `pg_constraint.confdeltype`/`confupdtype` codes.
    pub fn from_code(code: &str) -> Self {
        match code {
            "r" => Self::Restrict,
            "c" => Self::Cascade,
            "n" => Self::SetNull,
            "d" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDescriptor {
    pub name: String,
    pub data_type: String,
    pub start_value: String,
    pub increment: String,
    pub min_value: String,
    pub max_value: String,
    pub cycle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedViewDescriptor {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    /// Output of `pg_get_function_identity_arguments`, used for DROP.
    pub identity_args: String,
    pub language: String,
    /// Full `CREATE OR REPLACE FUNCTION` statement.
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub name: String,
    pub table: String,
    /// Full `CREATE TRIGGER` statement.
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDescriptor {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollationDescriptor {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub lc_collate: Option<String>,
    #[serde(default)]
    pub lc_ctype: Option<String>,
}

/// One row-level-security policy attached to a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    pub name: String,
    pub table: String,
    pub permissive: bool,
    /// Command scope: ALL, SELECT, INSERT, UPDATE or DELETE.
    pub command: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub using_expr: Option<String>,
    #[serde(default)]
    pub check_expr: Option<String>,
}

impl PolicyDescriptor {
    /// The key used in the top-level policy category map.
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }
}

/// Table privileges granted to one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivilegeDescriptor {
    pub grantee: String,
    pub table: String,
    pub privileges: Vec<String>,
}

impl PrivilegeDescriptor {
    pub fn key(&self) -> String {
        format!("{}@{}", self.grantee, self.table)
    }
}
