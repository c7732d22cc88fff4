use anyhow::{Context, Result};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::{fs, path::Path};

use super::Dataset;

/// Render the dataset as CSV: one header line (the dataset's full header),
/// then one line per row. Missing cells are written empty; fields are quoted
/// only when they need it.
pub fn to_csv_bytes(dataset: &Dataset) -> Result<Vec<u8>> {
    let header = dataset.header();
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.write_record(&header).context("writing CSV header")?;
    for (idx, row) in dataset.rows().iter().enumerate() {
        wtr.write_record(header.iter().map(|col| row.get(col).unwrap_or("")))
            .with_context(|| format!("writing CSV row {}", idx + 1))?;
    }

    wtr.into_inner()
        .map_err(|e| e.into_error())
        .context("flushing CSV buffer")
}

/// Build the whole file in memory, then write it to `path` in one call,
/// creating or truncating it.
pub fn write_csv<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_csv_bytes(dataset)?;
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}
