//! Store facade
//!
//! `TableStore` owns the catalog and the operation ledger and routes every
//! public operation through the engines. Each mutation returns its operation
//! record synchronously; a failed operation writes nothing and records
//! nothing.
//!
//! Concurrency model: single writer per table, whole-file rewrite. No
//! internal locking is provided; concurrent mutations of the same table lose
//! updates rather than crash. Operations on different tables are independent.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::data::{self, RowBatch, Value};
use crate::engine::{DeleteEngine, MergeEngine};
use crate::history::{
    OperationArgs, OperationKind, OperationLedger, OperationRecord, OperationStats,
    OperationSummary, QueryStats,
};
use crate::query::{QueryScope, ScopeResolver};
use crate::table::{TableCatalog, TableEntry};
use crate::{FlatError, Result};

/// Shape and schema details of one table
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub exists: bool,
    pub rows: usize,
    pub columns: Vec<String>,
    /// Column name -> rendered Arrow data type
    pub dtypes: BTreeMap<String, String>,
}

/// Flat-file table store
pub struct TableStore {
    catalog: TableCatalog,
    ledger: OperationLedger,
}

impl TableStore {
    /// Open a store from its config file, creating it when absent
    pub fn open(config_path: &Path, data_path: &Path) -> Result<Self> {
        let catalog = TableCatalog::open(config_path, data_path)?;
        Ok(Self::with_catalog(catalog))
    }

    /// Wrap an already-loaded catalog with a fresh ledger
    pub fn with_catalog(catalog: TableCatalog) -> Self {
        Self {
            catalog,
            ledger: OperationLedger::new(),
        }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    // ========== CATALOG MANAGEMENT ==========

    pub fn register_table(&mut self, name: &str, entry: TableEntry, replace: bool) -> Result<()> {
        self.catalog.register_table(name, entry, replace)
    }

    pub fn update_table(&mut self, name: &str, entry: TableEntry) -> Result<()> {
        self.catalog.update_table(name, entry)
    }

    /// Drop a table descriptor; its CSV file stays on disk
    pub fn remove_table(&mut self, name: &str) -> Result<()> {
        self.catalog.remove_table(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    // ========== READS ==========

    /// Load a registered table's full contents
    pub fn read_table(&self, name: &str) -> Result<RowBatch> {
        self.catalog.entry(name)?;
        data::read_csv(&self.catalog.table_path(name))
    }

    /// Shape and dtypes of a registered table; `exists: false` with an empty
    /// shape when the file has not been written yet
    pub fn table_info(&self, name: &str) -> Result<TableInfo> {
        self.catalog.entry(name)?;
        let path = self.catalog.table_path(name);
        if !path.exists() {
            return Ok(TableInfo {
                name: name.to_string(),
                exists: false,
                rows: 0,
                columns: Vec::new(),
                dtypes: BTreeMap::new(),
            });
        }
        let batch = data::read_csv(&path)?;
        let dtypes = batch
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().to_string()))
            .collect();
        Ok(TableInfo {
            name: name.to_string(),
            exists: true,
            rows: batch.num_rows(),
            columns: batch.column_names(),
            dtypes,
        })
    }

    // ========== MUTATIONS ==========

    /// Merge a batch into a table by its key columns and record the operation
    pub fn upsert(&mut self, table: &str, incoming: &RowBatch) -> Result<Arc<OperationRecord>> {
        let stats = MergeEngine::upsert(&self.catalog, table, incoming)?;
        let args = OperationArgs::Upsert {
            table: table.to_string(),
            input_rows: incoming.num_rows(),
            input_columns: incoming.num_columns(),
            key_columns: self.catalog.entry(table)?.key_columns.clone(),
        };
        let summary = stats.summary();
        info!(table, summary = %summary, "upsert");
        let record = Arc::new(OperationRecord::new(
            OperationKind::Upsert,
            args,
            OperationStats::Merge(stats),
            summary,
        ));
        self.ledger.record(table, Arc::clone(&record));
        Ok(record)
    }

    /// Delete rows whose `column` value lies in `[min, max]` and record it
    pub fn delete_by_range(
        &mut self,
        table: &str,
        column: &str,
        min: Value,
        max: Value,
    ) -> Result<Arc<OperationRecord>> {
        let stats = DeleteEngine::delete_by_range(&self.catalog, table, column, &min, &max)?;
        let summary = stats.range_summary(&min, &max);
        info!(table, column, summary = %summary, "delete_by_range");
        let record = Arc::new(OperationRecord::new(
            OperationKind::DeleteByRange,
            OperationArgs::DeleteByRange {
                table: table.to_string(),
                column: column.to_string(),
                min,
                max,
            },
            OperationStats::Delete(stats),
            summary,
        ));
        self.ledger.record(table, Arc::clone(&record));
        Ok(record)
    }

    /// Delete rows whose `column` equals `value` exactly and record it
    pub fn delete_by_key(
        &mut self,
        table: &str,
        column: &str,
        value: Value,
    ) -> Result<Arc<OperationRecord>> {
        let stats = DeleteEngine::delete_by_key(&self.catalog, table, column, &value)?;
        let summary = stats.key_summary(column, &value);
        info!(table, column, summary = %summary, "delete_by_key");
        let record = Arc::new(OperationRecord::new(
            OperationKind::DeleteByKey,
            OperationArgs::DeleteByKey {
                table: table.to_string(),
                column: column.to_string(),
                value,
            },
            OperationStats::Delete(stats),
            summary,
        ));
        self.ledger.record(table, Arc::clone(&record));
        Ok(record)
    }

    // ========== QUERIES ==========

    /// Text-level safety check only; no table is touched
    pub fn validate_query(&self, query: &str) -> bool {
        ScopeResolver::validate(query)
    }

    /// Validate a query and resolve its table scope. Nothing is loaded and
    /// nothing is recorded; rejected queries fail with `UnsafeQuery`.
    pub fn plan_query(&self, query: &str) -> Result<QueryScope> {
        if !ScopeResolver::validate(query) {
            return Err(FlatError::UnsafeQuery(
                "query contains dangerous operations or syntax errors".to_string(),
            ));
        }
        Ok(ScopeResolver::resolve(query, self.catalog.table_names()))
    }

    /// Open exactly the tables a resolved scope allows. Registered tables
    /// whose file is missing are skipped, matching a half-written store
    /// rather than failing the whole query.
    pub fn load_query_tables(&self, scope: &QueryScope) -> Result<HashMap<String, RowBatch>> {
        let mut loaded = HashMap::with_capacity(scope.tables_to_load.len());
        for name in &scope.tables_to_load {
            let path = self.catalog.table_path(name);
            if !path.exists() {
                warn!(table = %name, "table registered but file missing; skipped from scope");
                continue;
            }
            loaded.insert(name.clone(), data::read_csv(&path)?);
        }
        Ok(loaded)
    }

    /// Record a query the external engine has executed against a scope
    /// produced by [`plan_query`](Self::plan_query). One shared record is
    /// appended to every table in scope.
    pub fn record_query(
        &mut self,
        query: &str,
        scope: &QueryScope,
        stats: QueryStats,
    ) -> Arc<OperationRecord> {
        let tables_used: Vec<String> = scope.tables_to_load.iter().cloned().collect();
        let summary = stats.summary();
        let record = Arc::new(OperationRecord::new(
            OperationKind::Query,
            OperationArgs::Query {
                query: query.to_string(),
                tables_used: tables_used.clone(),
            },
            OperationStats::Query(stats),
            summary,
        ));
        self.ledger
            .record_many(tables_used.iter().map(String::as_str), Arc::clone(&record));
        record
    }

    // ========== HISTORY ==========

    pub fn history(&self, table: &str) -> &[Arc<OperationRecord>] {
        self.ledger.history(table)
    }

    pub fn all_history(&self) -> &BTreeMap<String, Vec<Arc<OperationRecord>>> {
        self.ledger.all_history()
    }

    pub fn summary(&self, table: Option<&str>) -> OperationSummary {
        self.ledger.summary(table)
    }

    pub fn recent(&self, table: Option<&str>, limit: usize) -> Vec<Arc<OperationRecord>> {
        self.ledger.recent(table, limit)
    }
}
