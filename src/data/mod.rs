//! Row set abstraction
//!
//! Bridges the crate to the Arrow tabular engine: `RowBatch` wraps a single
//! `RecordBatch` and exposes the handful of set-level operations the engines
//! need (project, filter, anti-join, concatenate), while `csv` handles
//! whole-file load and rewrite.

mod batch;
mod csv;
mod value;

pub use batch::RowBatch;
pub use csv::{read_csv, write_csv};
pub use value::{value_at, Value};
