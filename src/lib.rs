//! Flatbase Core Storage Engine
//!
//! A flat-file table store: every registered table is a single CSV file under
//! a shared data root. Provides dedup-aware upsert, predicate deletes, query
//! scope resolution, and an append-only ledger of every operation.
//!
//! Columnar representation and CSV serialization are delegated to Arrow;
//! this crate owns the merge/delete semantics, the table catalog, the query
//! safety net, and the operation history.

pub mod data;
pub mod engine;
pub mod history;
pub mod query;
pub mod store;
pub mod table;

// Re-export main types
pub use data::{RowBatch, Value};
pub use engine::{DeleteStats, MergeStats};
pub use history::{
    OperationArgs, OperationKind, OperationLedger, OperationRecord, OperationStats,
    OperationSummary, QueryStats,
};
pub use query::{QueryScope, ScopeResolver};
pub use store::{TableInfo, TableStore};
pub use table::{TableCatalog, TableEntry};

/// Storage engine error type
#[derive(Debug, thiserror::Error)]
pub enum FlatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Key columns missing from batch: {}", .0.join(", "))]
    KeyColumnsMissing(Vec<String>),

    #[error("Input batch is empty")]
    EmptyBatch,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unsafe query rejected: {0}")]
    UnsafeQuery(String),

    #[error("Invalid catalog config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FlatError>;
