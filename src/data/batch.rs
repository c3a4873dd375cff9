//! Row batches
//!
//! `RowBatch` is an ordered, immutable snapshot of table rows backed by one
//! Arrow `RecordBatch`. Transforms never mutate in place; they return a new
//! batch sharing the underlying buffers.

use std::sync::Arc;

use ahash::AHashSet;
use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::{cast, concat_batches, filter_record_batch};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use super::value::{value_at, Value};
use crate::{FlatError, Result};

/// Separator between key-column tokens inside one key tuple
const KEY_SEP: char = '\u{1f}';

/// An ordered, in-memory table snapshot with a fixed column set
#[derive(Debug, Clone)]
pub struct RowBatch {
    batch: RecordBatch,
}

impl RowBatch {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// An empty batch with the given schema
    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(RecordBatch::new_empty(schema))
    }

    pub fn inner(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_inner(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.batch
            .schema()
            .index_of(name)
            .map_err(|_| FlatError::ColumnNotFound(name.to_string()))
    }

    /// Materialize one cell
    pub fn value_at(&self, row: usize, column: &str) -> Result<Value> {
        let idx = self.column_index(column)?;
        Ok(value_at(self.batch.column(idx).as_ref(), row))
    }

    /// New batch containing only the named columns, in the given order
    pub fn project(&self, columns: &[String]) -> Result<RowBatch> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(self.batch.project(&indices)?))
    }

    /// New batch keeping only rows where the mask is true
    pub fn filter(&self, mask: &BooleanArray) -> Result<RowBatch> {
        Ok(Self::new(filter_record_batch(&self.batch, mask)?))
    }

    /// Build a boolean mask from a per-row predicate on one column
    pub fn mask_by<F>(&self, column: &str, predicate: F) -> Result<BooleanArray>
    where
        F: Fn(&Value) -> bool,
    {
        let idx = self.column_index(column)?;
        let array = self.batch.column(idx);
        let mask: Vec<bool> = (0..self.num_rows())
            .map(|row| predicate(&value_at(array.as_ref(), row)))
            .collect();
        Ok(BooleanArray::from(mask))
    }

    /// Render one key tuple per row from the named key columns.
    ///
    /// Fails with `KeyColumnsMissing` listing every absent column, so callers
    /// surface the full schema violation at once.
    pub fn key_rows(&self, key_columns: &[String]) -> Result<Vec<String>> {
        let missing: Vec<String> = key_columns
            .iter()
            .filter(|c| !self.has_column(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FlatError::KeyColumnsMissing(missing));
        }

        let arrays: Vec<&ArrayRef> = key_columns
            .iter()
            .map(|c| {
                let idx = self.column_index(c)?;
                Ok(self.batch.column(idx))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut keys = Vec::with_capacity(self.num_rows());
        for row in 0..self.num_rows() {
            let mut key = String::new();
            for (i, array) in arrays.iter().enumerate() {
                if i > 0 {
                    key.push(KEY_SEP);
                }
                key.push_str(&value_at(array.as_ref(), row).key_token());
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Set-difference by key: rows of `self` whose key tuple does not appear
    /// in `right`. Row order of `self` is preserved.
    pub fn anti_join(&self, right: &RowBatch, key_columns: &[String]) -> Result<RowBatch> {
        let right_keys: AHashSet<String> = right.key_rows(key_columns)?.into_iter().collect();
        let mask: BooleanArray = self
            .key_rows(key_columns)?
            .iter()
            .map(|k| Some(!right_keys.contains(k)))
            .collect();
        self.filter(&mask)
    }

    /// New batch with `other`'s rows appended after `self`'s.
    ///
    /// `other` is aligned to `self`'s column order by name and cast to its
    /// column types; a column set mismatch is a schema error.
    pub fn concat(&self, other: &RowBatch) -> Result<RowBatch> {
        if self.num_columns() != other.num_columns() {
            return Err(FlatError::Arrow(ArrowError::SchemaError(format!(
                "column count mismatch: {} vs {}",
                self.num_columns(),
                other.num_columns()
            ))));
        }

        // Nullability is widened on both sides: two files of the same table
        // routinely disagree after schema inference.
        let schema = nullable_schema(&self.batch.schema());
        let left = RecordBatch::try_new(Arc::clone(&schema), self.batch.columns().to_vec())?;

        let mut aligned: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let idx = other.column_index(field.name())?;
            let column = other.batch.column(idx);
            if column.data_type() == field.data_type() {
                aligned.push(Arc::clone(column));
            } else {
                aligned.push(cast(column.as_ref(), field.data_type())?);
            }
        }
        let right = RecordBatch::try_new(Arc::clone(&schema), aligned)?;

        let merged = concat_batches(&schema, [&left, &right])?;
        Ok(Self::new(merged))
    }
}

impl From<RecordBatch> for RowBatch {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch)
    }
}

fn nullable_schema(schema: &SchemaRef) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), f.data_type().clone(), true))
        .collect();
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::DataType;

    fn batch(ids: &[i64], names: &[&str]) -> RowBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let ids = Arc::new(Int64Array::from(ids.to_vec())) as ArrayRef;
        let names = Arc::new(StringArray::from(names.to_vec())) as ArrayRef;
        RowBatch::new(RecordBatch::try_new(schema, vec![ids, names]).unwrap())
    }

    fn key(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_anti_join_removes_matching_keys() {
        let left = batch(&[1, 2, 3], &["a", "b", "c"]);
        let right = batch(&[2, 9], &["x", "y"]);

        let out = left.anti_join(&right, &key(&["id"])).unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.value_at(0, "id").unwrap(), Value::Int64(1));
        assert_eq!(out.value_at(1, "id").unwrap(), Value::Int64(3));
    }

    #[test]
    fn test_anti_join_missing_key_column() {
        let left = batch(&[1], &["a"]);
        let right = batch(&[1], &["a"]);
        let err = left.anti_join(&right, &key(&["customer_id"])).unwrap_err();
        assert!(matches!(err, FlatError::KeyColumnsMissing(cols) if cols == vec!["customer_id"]));
    }

    #[test]
    fn test_concat_appends_at_tail() {
        let left = batch(&[1, 2], &["a", "b"]);
        let right = batch(&[3], &["c"]);

        let out = left.concat(&right).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.value_at(2, "name").unwrap(), Value::String("c".into()));
    }

    #[test]
    fn test_concat_aligns_column_order() {
        let left = batch(&[1], &["a"]);

        // Same columns, reversed order
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("id", DataType::Int64, false),
        ]));
        let names = Arc::new(StringArray::from(vec!["b"])) as ArrayRef;
        let ids = Arc::new(Int64Array::from(vec![2i64])) as ArrayRef;
        let right = RowBatch::new(RecordBatch::try_new(schema, vec![names, ids]).unwrap());

        let out = left.concat(&right).unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.value_at(1, "id").unwrap(), Value::Int64(2));
        assert_eq!(out.value_at(1, "name").unwrap(), Value::String("b".into()));
    }

    #[test]
    fn test_project_selects_and_orders() {
        let b = batch(&[1], &["a"]);
        let out = b.project(&key(&["name"])).unwrap();
        assert_eq!(out.num_columns(), 1);
        assert_eq!(out.column_names(), vec!["name"]);

        let err = b.project(&key(&["missing"])).unwrap_err();
        assert!(matches!(err, FlatError::ColumnNotFound(_)));
    }

    #[test]
    fn test_mask_by_predicate() {
        let b = batch(&[1, 5, 9], &["a", "b", "c"]);
        let mask = b
            .mask_by("id", |v| v.in_range(&Value::Int64(2), &Value::Int64(9)))
            .unwrap();
        let out = b.filter(&mask).unwrap();
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_composite_keys() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Utf8, false),
        ]));
        let a = Arc::new(Int64Array::from(vec![1i64, 1])) as ArrayRef;
        let b = Arc::new(StringArray::from(vec!["x", "y"])) as ArrayRef;
        let left = RowBatch::new(RecordBatch::try_new(Arc::clone(&schema), vec![a, b]).unwrap());

        let a = Arc::new(Int64Array::from(vec![1i64])) as ArrayRef;
        let b = Arc::new(StringArray::from(vec!["y"])) as ArrayRef;
        let right = RowBatch::new(RecordBatch::try_new(schema, vec![a, b]).unwrap());

        let out = left.anti_join(&right, &key(&["a", "b"])).unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(out.value_at(0, "b").unwrap(), Value::String("x".into()));
    }
}
