//! Table management module
//!
//! The catalog maps table names to their merge keys and resolves each table
//! to its CSV file under the data root.

mod catalog;

pub use catalog::{TableCatalog, TableEntry};
