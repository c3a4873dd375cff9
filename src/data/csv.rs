//! CSV persistence
//!
//! Arrow owns parsing, schema inference and serialization; this module only
//! wires whole-file loads and whole-file rewrites. There is deliberately no
//! append path: every mutation persists the complete table.

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};

use super::RowBatch;
use crate::Result;

/// Rows sampled when inferring column types from a file
const INFER_SCHEMA_ROWS: usize = 5000;

const READ_BATCH_SIZE: usize = 8192;

/// Load a whole CSV file into one row batch.
///
/// The header row names the columns; types (including dates) are inferred
/// from a sample of the file.
pub fn read_csv(path: &Path) -> Result<RowBatch> {
    let mut file = File::open(path)?;
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, Some(INFER_SCHEMA_ROWS))?;
    file.rewind()?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .with_batch_size(READ_BATCH_SIZE)
        .build(file)?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    if batches.is_empty() {
        return Ok(RowBatch::empty(schema));
    }
    let merged = concat_batches(&schema, &batches)?;
    Ok(RowBatch::new(merged))
}

/// Rewrite the file at `path` with the batch's full contents, header included
pub fn write_csv(batch: &RowBatch, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch.inner())?;
    Ok(())
}
