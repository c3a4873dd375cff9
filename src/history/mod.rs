//! Operation history ledger
//!
//! Append-only record of every mutation and executed query, kept per table.
//! Records are immutable once created and shared: an operation touching
//! several tables appends one `Arc` reference to each table's sequence, not
//! a copy. The ledger is owned by the store; there is no global instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::Value;
use crate::engine::{DeleteStats, MergeStats};

/// Scope label used by [`OperationSummary`] when no table is given
const ALL_TABLES: &str = "ALL";

/// What an operation was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upsert,
    DeleteByRange,
    DeleteByKey,
    Query,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Upsert => "upsert",
            OperationKind::DeleteByRange => "delete_by_range",
            OperationKind::DeleteByKey => "delete_by_key",
            OperationKind::Query => "query",
        }
    }
}

/// Kind-specific operation arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationArgs {
    Upsert {
        table: String,
        input_rows: usize,
        input_columns: usize,
        key_columns: Vec<String>,
    },
    DeleteByRange {
        table: String,
        column: String,
        min: Value,
        max: Value,
    },
    DeleteByKey {
        table: String,
        column: String,
        value: Value,
    },
    Query {
        query: String,
        tables_used: Vec<String>,
    },
}

/// Statistics reported back for an executed query. The execution itself
/// happens in the external engine; its caller fills these in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub result_rows: usize,
    pub result_columns: usize,
    pub tables_accessed: usize,
    pub execution_time_seconds: f64,
}

impl QueryStats {
    pub(crate) fn summary(&self) -> String {
        format!(
            "Query executed in {}s, returned {} rows from {} tables",
            self.execution_time_seconds, self.result_rows, self.tables_accessed
        )
    }
}

/// Kind-specific statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStats {
    Merge(MergeStats),
    Delete(DeleteStats),
    Query(QueryStats),
}

/// One ledger entry. Immutable once created; never edited, never evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub args: OperationArgs,
    pub stats: OperationStats,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl OperationRecord {
    pub(crate) fn new(
        kind: OperationKind,
        args: OperationArgs,
        stats: OperationStats,
        summary: String,
    ) -> Self {
        Self {
            kind,
            args,
            stats,
            summary,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated view over a table's (or the whole store's) operations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub table: String,
    pub total_operations: usize,
    /// Operation-kind name -> count
    pub operations: BTreeMap<String, usize>,
    pub total_duplicates_handled: usize,
    pub total_rows_inserted: usize,
    pub total_rows_deleted: usize,
    pub total_queries: usize,
}

impl OperationSummary {
    fn empty(table: String) -> Self {
        Self {
            table,
            total_operations: 0,
            operations: BTreeMap::new(),
            total_duplicates_handled: 0,
            total_rows_inserted: 0,
            total_rows_deleted: 0,
            total_queries: 0,
        }
    }
}

/// Append-only, per-table sequences of operation records
#[derive(Debug, Default)]
pub struct OperationLedger {
    history: BTreeMap<String, Vec<Arc<OperationRecord>>>,
}

impl OperationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to one table's sequence
    pub fn record(&mut self, table: &str, record: Arc<OperationRecord>) {
        self.history.entry(table.to_string()).or_default().push(record);
    }

    /// Fan one shared record out to several tables. Each sequence gets a
    /// reference to the same immutable entry.
    pub fn record_many<'a, I>(&mut self, tables: I, record: Arc<OperationRecord>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for table in tables {
            self.record(table, Arc::clone(&record));
        }
    }

    /// A table's records in chronological (insertion) order
    pub fn history(&self, table: &str) -> &[Arc<OperationRecord>] {
        self.history.get(table).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Every table's sequence
    pub fn all_history(&self) -> &BTreeMap<String, Vec<Arc<OperationRecord>>> {
        &self.history
    }

    fn scope_records(&self, table: Option<&str>) -> Vec<&Arc<OperationRecord>> {
        match table {
            Some(name) => self.history(name).iter().collect(),
            None => self.history.values().flatten().collect(),
        }
    }

    /// Aggregate operation counts and totals over one table or the whole store
    pub fn summary(&self, table: Option<&str>) -> OperationSummary {
        let label = table.unwrap_or(ALL_TABLES).to_string();
        let mut summary = OperationSummary::empty(label);

        for record in self.scope_records(table) {
            summary.total_operations += 1;
            *summary
                .operations
                .entry(record.kind.as_str().to_string())
                .or_insert(0) += 1;
            match &record.stats {
                OperationStats::Merge(stats) => {
                    summary.total_duplicates_handled += stats.duplicates_found;
                    summary.total_rows_inserted += stats.rows_newly_inserted;
                }
                OperationStats::Delete(stats) => {
                    summary.total_rows_deleted += stats.rows_deleted;
                }
                OperationStats::Query(_) => {
                    summary.total_queries += 1;
                }
            }
        }
        summary
    }

    /// Top-`limit` records, newest first. Ties keep insertion order.
    pub fn recent(&self, table: Option<&str>, limit: usize) -> Vec<Arc<OperationRecord>> {
        let mut records: Vec<Arc<OperationRecord>> =
            self.scope_records(table).into_iter().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }
}
