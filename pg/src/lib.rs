//! Postgres schema engine for nubase.
//!
//! Everything needed to keep a database and a set of migration files in
//! agreement, split into pure and effectful halves:
//!
//! - [`model`] - serializable descriptors for every schema object category
//! - [`extract`] - introspect a live database into a [`SchemaModel`]
//! - [`diff`] - pure structural comparison of two models
//! - [`generate`] - turn a diff into dependency-ordered SQL with destructive
//!   changes gated behind an explicit opt-in
//! - [`ledger`] - the applied-migrations bookkeeping table
//!
//! The comparison and generation layers never touch a connection, which keeps
//! them testable without a server.

pub mod diff;
pub mod error;
pub mod extract;
pub mod generate;
pub mod ledger;
pub mod model;

pub use diff::{SchemaDiff, diff};
pub use error::PgError;
pub use extract::{connect, extract};
pub use generate::{GenerateOptions, MigrationPlan, Warning, generate};
pub use model::SchemaModel;
pub use sqlx::PgPool;
