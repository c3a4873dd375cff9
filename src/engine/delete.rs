//! Delete engine
//!
//! Removes rows by an inclusive range predicate or an exact key match on one
//! column, then rewrites the table file with the complementary row set. Null
//! cells never match either predicate.

use arrow::compute::not;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pct;
use crate::data::{self, Value};
use crate::table::TableCatalog;
use crate::{FlatError, Result};

/// Statistics of one delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStats {
    pub old_table_size: usize,
    pub new_table_size: usize,
    pub rows_deleted: usize,
    pub rows_preserved: usize,
    /// Deleted share of the old table, in percent
    pub deletion_rate: f64,
    /// Surviving share of the old table, in percent
    pub preservation_rate: f64,
}

impl DeleteStats {
    pub(crate) fn range_summary(&self, min: &Value, max: &Value) -> String {
        format!(
            "Deleted {} rows ({}% of table) between {} and {}",
            self.rows_deleted, self.deletion_rate, min, max
        )
    }

    pub(crate) fn key_summary(&self, column: &str, value: &Value) -> String {
        format!(
            "Deleted {} rows ({}% of table) with {}='{}'",
            self.rows_deleted, self.deletion_rate, column, value
        )
    }
}

/// Predicate deletes over one table file
pub struct DeleteEngine;

impl DeleteEngine {
    /// Delete rows where `column` lies in `[min, max]`, bounds included
    pub fn delete_by_range(
        catalog: &TableCatalog,
        table: &str,
        column: &str,
        min: &Value,
        max: &Value,
    ) -> Result<DeleteStats> {
        Self::delete_where(catalog, table, column, |v| v.in_range(min, max))
    }

    /// Delete rows where `column` equals `value` exactly
    pub fn delete_by_key(
        catalog: &TableCatalog,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<DeleteStats> {
        Self::delete_where(catalog, table, column, |v| v.equals(value))
    }

    fn delete_where<F>(
        catalog: &TableCatalog,
        table: &str,
        column: &str,
        predicate: F,
    ) -> Result<DeleteStats>
    where
        F: Fn(&Value) -> bool,
    {
        catalog.entry(table)?;
        let path = catalog.table_path(table);
        let existing = data::read_csv(&path)?;
        if !existing.has_column(column) {
            return Err(FlatError::ColumnNotFound(column.to_string()));
        }

        let doomed = existing.mask_by(column, predicate)?;
        let rows_deleted = doomed.true_count();
        let kept = existing.filter(&not(&doomed)?)?;

        data::write_csv(&kept, &path)?;

        let old_size = existing.num_rows();
        let new_size = kept.num_rows();
        debug!(table, column, rows_deleted, "delete persisted");
        Ok(DeleteStats {
            old_table_size: old_size,
            new_table_size: new_size,
            rows_deleted,
            rows_preserved: new_size,
            deletion_rate: pct(rows_deleted, old_size),
            preservation_rate: pct(new_size, old_size),
        })
    }
}
