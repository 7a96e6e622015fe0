//! Store implementations.
//!
//! All SQL backends share one logical schema (see [`crate::record`]); only
//! placeholder and upsert syntax differ.

pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
use crate::record::COLUMNS;

/// Table holding one row per logical spawner.
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub(crate) const TABLE: &str = "spawnvault_spawners";

/// `col1, col2, ...` in canonical order.
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub(crate) fn column_list() -> String {
    COLUMNS.join(", ")
}

/// `SELECT <columns> FROM <table>`.
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub(crate) fn select_all() -> String {
    format!("SELECT {} FROM {TABLE}", column_list())
}

/// Columns updated on conflict: everything but the key.
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub(crate) fn update_columns() -> impl Iterator<Item = &'static str> {
    COLUMNS.iter().copied().filter(|c| *c != "id")
}
