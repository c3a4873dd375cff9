//! Upsert engine
//!
//! Merges an incoming batch into a table by the catalog's key columns. Rows
//! of the existing file whose key tuple reappears in the incoming batch are
//! dropped (the incoming version replaces them), every other existing row is
//! preserved, and the incoming rows land at the tail in their own order. The
//! table file is rewritten in full.
//!
//! Duplicate keys *inside* the incoming batch are not deduplicated: all of
//! them are persisted, and on the next merge the key matches once, so the
//! later row effectively wins. Callers that need stronger guarantees must
//! dedup before calling.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pct;
use crate::data::{self, RowBatch};
use crate::table::TableCatalog;
use crate::{FlatError, Result};

/// Statistics of one merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Rows in the incoming batch
    pub input_rows: usize,
    /// Existing rows whose key tuple matched an incoming row
    pub duplicates_found: usize,
    /// Existing rows replaced by an incoming row (same as duplicates found)
    pub rows_updated: usize,
    /// Incoming rows whose key was absent from the existing table
    pub rows_newly_inserted: usize,
    /// Existing rows carried over untouched
    pub rows_preserved: usize,
    pub old_table_size: usize,
    pub new_table_size: usize,
    pub net_rows_added: i64,
    /// Share of input rows that replaced an existing row, in percent
    pub duplication_rate: f64,
}

impl MergeStats {
    pub(crate) fn summary(&self) -> String {
        format!(
            "Inserted {} rows: {} new, {} updates, {} duplicates handled",
            self.input_rows, self.rows_newly_inserted, self.rows_updated, self.duplicates_found
        )
    }
}

/// Dedup-aware merge of a row batch into a table file
pub struct MergeEngine;

impl MergeEngine {
    /// Merge `incoming` into `table`, rewriting its storage in full.
    ///
    /// Fails before any write when the table is unregistered, the batch is
    /// empty, or a key column is missing from the batch.
    pub fn upsert(catalog: &TableCatalog, table: &str, incoming: &RowBatch) -> Result<MergeStats> {
        let entry = catalog.entry(table)?;
        let key_columns = &entry.key_columns;

        if incoming.num_rows() == 0 || incoming.num_columns() == 0 {
            return Err(FlatError::EmptyBatch);
        }
        let missing: Vec<String> = key_columns
            .iter()
            .filter(|c| !incoming.has_column(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FlatError::KeyColumnsMissing(missing));
        }

        let path = catalog.table_path(table);
        let input_rows = incoming.num_rows();

        let (result, stats) = if path.exists() {
            let existing = data::read_csv(&path)?;
            let old_size = existing.num_rows();

            let preserved = existing.anti_join(incoming, key_columns)?;
            let duplicates_found = old_size - preserved.num_rows();
            let fresh = incoming.anti_join(&existing, key_columns)?;

            let result = preserved.concat(incoming)?;
            let new_size = result.num_rows();
            let stats = MergeStats {
                input_rows,
                duplicates_found,
                rows_updated: duplicates_found,
                rows_newly_inserted: fresh.num_rows(),
                rows_preserved: preserved.num_rows(),
                old_table_size: old_size,
                new_table_size: new_size,
                net_rows_added: new_size as i64 - old_size as i64,
                duplication_rate: pct(duplicates_found, input_rows),
            };
            (result, stats)
        } else {
            // First write: the table file is exactly the incoming batch
            let stats = MergeStats {
                input_rows,
                duplicates_found: 0,
                rows_updated: 0,
                rows_newly_inserted: input_rows,
                rows_preserved: 0,
                old_table_size: 0,
                new_table_size: input_rows,
                net_rows_added: input_rows as i64,
                duplication_rate: 0.0,
            };
            (incoming.clone(), stats)
        };

        data::write_csv(&result, &path)?;
        debug!(
            table,
            rows = stats.new_table_size,
            updated = stats.rows_updated,
            "upsert persisted"
        );
        Ok(stats)
    }
}
