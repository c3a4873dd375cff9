//! Table catalog
//!
//! Registry of table descriptors persisted as a JSON document:
//!
//! ```json
//! {
//!     "tables": {
//!         "customers": { "key_columns": ["customer_id"] }
//!     },
//!     "data_path": "/var/lib/flatbase/data"
//! }
//! ```
//!
//! Every registered table stores its rows in `{data_path}/{name}.csv`.
//! Removing a table only drops the descriptor; the CSV file is left in place
//! until the next write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{FlatError, Result};

/// File extension for table storage
const TABLE_FILE_EXT: &str = "csv";

/// Per-table descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Columns whose combined value identifies a logical row for merges
    pub key_columns: Vec<String>,
}

impl TableEntry {
    pub fn new<S: Into<String>>(key_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            key_columns: key_columns.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self, table: &str) -> Result<()> {
        if self.key_columns.is_empty() {
            return Err(FlatError::InvalidConfig(format!(
                "table '{table}' has no key columns"
            )));
        }
        if self.key_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(FlatError::InvalidConfig(format!(
                "table '{table}' has a blank key column name"
            )));
        }
        Ok(())
    }
}

/// On-disk document shape
#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    tables: BTreeMap<String, TableEntry>,
    data_path: PathBuf,
}

/// Table catalog: name -> descriptor, plus the data root
#[derive(Debug, Clone)]
pub struct TableCatalog {
    tables: BTreeMap<String, TableEntry>,
    data_path: PathBuf,
    config_path: PathBuf,
}

impl TableCatalog {
    /// Open a catalog: load the config file if present, otherwise create it
    /// with an empty table set. The data directory is created eagerly.
    pub fn open(config_path: &Path, data_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::create_dir_all(data_path)?;
            let catalog = Self {
                tables: BTreeMap::new(),
                data_path: data_path.to_path_buf(),
                config_path: config_path.to_path_buf(),
            };
            catalog.save()?;
            Ok(catalog)
        }
    }

    /// Load and validate an existing config file
    pub fn load(config_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(config_path)?;
        let doc: CatalogDocument = serde_json::from_str(&text)?;
        for (name, entry) in &doc.tables {
            entry.validate(name)?;
        }
        fs::create_dir_all(&doc.data_path)?;
        Ok(Self {
            tables: doc.tables,
            data_path: doc.data_path,
            config_path: config_path.to_path_buf(),
        })
    }

    /// Persist the catalog document, overwriting the config file
    pub fn save(&self) -> Result<()> {
        let doc = CatalogDocument {
            tables: self.tables.clone(),
            data_path: self.data_path.clone(),
        };
        let text = serde_json::to_string_pretty(&doc)?;
        fs::write(&self.config_path, text)?;
        Ok(())
    }

    /// Register a new table. With `replace` false an existing name is an error.
    pub fn register_table(&mut self, name: &str, entry: TableEntry, replace: bool) -> Result<()> {
        if !replace && self.tables.contains_key(name) {
            return Err(FlatError::TableExists(name.to_string()));
        }
        entry.validate(name)?;
        self.tables.insert(name.to_string(), entry);
        self.save()
    }

    /// Replace the descriptor of an existing table
    pub fn update_table(&mut self, name: &str, entry: TableEntry) -> Result<()> {
        if !self.tables.contains_key(name) {
            return Err(FlatError::TableNotFound(name.to_string()));
        }
        entry.validate(name)?;
        self.tables.insert(name.to_string(), entry);
        self.save()
    }

    /// Drop a table descriptor. The CSV file is left untouched.
    pub fn remove_table(&mut self, name: &str) -> Result<()> {
        if self.tables.remove(name).is_none() {
            return Err(FlatError::TableNotFound(name.to_string()));
        }
        self.save()
    }

    /// Move the data root; the directory is created if needed
    pub fn set_data_path(&mut self, data_path: &Path) -> Result<()> {
        fs::create_dir_all(data_path)?;
        self.data_path = data_path.to_path_buf();
        self.save()
    }

    pub fn entry(&self, name: &str) -> Result<&TableEntry> {
        self.tables
            .get(name)
            .ok_or_else(|| FlatError::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Storage location of a table: `{data_path}/{name}.csv`
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.data_path
            .join(format!("{name}.{ext}", ext = TABLE_FILE_EXT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, TableCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog =
            TableCatalog::open(&dir.path().join("db.json"), &dir.path().join("data")).unwrap();
        (dir, catalog)
    }

    #[test]
    fn test_register_and_lookup() {
        let (_dir, mut catalog) = open_temp();
        catalog
            .register_table("customers", TableEntry::new(["customer_id"]), false)
            .unwrap();

        assert!(catalog.contains("customers"));
        assert_eq!(
            catalog.entry("customers").unwrap().key_columns,
            vec!["customer_id"]
        );
        assert!(catalog
            .table_path("customers")
            .to_string_lossy()
            .ends_with("customers.csv"));
    }

    #[test]
    fn test_register_duplicate_fails_unless_replace() {
        let (_dir, mut catalog) = open_temp();
        catalog
            .register_table("t", TableEntry::new(["k"]), false)
            .unwrap();

        let err = catalog
            .register_table("t", TableEntry::new(["k2"]), false)
            .unwrap_err();
        assert!(matches!(err, FlatError::TableExists(_)));

        catalog
            .register_table("t", TableEntry::new(["k2"]), true)
            .unwrap();
        assert_eq!(catalog.entry("t").unwrap().key_columns, vec!["k2"]);
    }

    #[test]
    fn test_empty_key_columns_rejected() {
        let (_dir, mut catalog) = open_temp();
        let err = catalog
            .register_table("t", TableEntry::new(Vec::<String>::new()), false)
            .unwrap_err();
        assert!(matches!(err, FlatError::InvalidConfig(_)));
    }

    #[test]
    fn test_roundtrip_through_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("db.json");
        {
            let mut catalog = TableCatalog::open(&config, &dir.path().join("data")).unwrap();
            catalog
                .register_table("orders", TableEntry::new(["order_id", "line"]), false)
                .unwrap();
        }

        let reloaded = TableCatalog::load(&config).unwrap();
        assert_eq!(
            reloaded.entry("orders").unwrap().key_columns,
            vec!["order_id", "line"]
        );
        assert_eq!(reloaded.table_names(), vec!["orders"]);
    }

    #[test]
    fn test_load_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("db.json");
        std::fs::write(&config, "{\"tables\": 5}").unwrap();
        assert!(TableCatalog::load(&config).is_err());

        // Structurally valid JSON but an empty key list
        std::fs::write(
            &config,
            format!(
                "{{\"tables\": {{\"t\": {{\"key_columns\": []}}}}, \"data_path\": {:?}}}",
                dir.path().join("data")
            ),
        )
        .unwrap();
        let err = TableCatalog::load(&config).unwrap_err();
        assert!(matches!(err, FlatError::InvalidConfig(_)));
    }

    #[test]
    fn test_remove_table_keeps_file() {
        let (_dir, mut catalog) = open_temp();
        catalog
            .register_table("t", TableEntry::new(["k"]), false)
            .unwrap();
        let path = catalog.table_path("t");
        std::fs::write(&path, "k\n1\n").unwrap();

        catalog.remove_table("t").unwrap();
        assert!(!catalog.contains("t"));
        assert!(path.exists());

        let err = catalog.remove_table("t").unwrap_err();
        assert!(matches!(err, FlatError::TableNotFound(_)));
    }
}
