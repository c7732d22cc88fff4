// src/process/mod.rs
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::Config;

pub mod merge;
pub mod normalize;
pub mod reader;
pub mod tag;
pub mod write;

pub use merge::merge_datasets;
pub use normalize::{normalize_columns, normalize_dataset, normalize_key, normalize_row};
pub use reader::{ColumnMismatch, CsvReader, ParsedCsv};
pub use tag::{tag_status, STATUS_COLUMN};
pub use write::{to_csv_bytes, write_csv};

/// One CSV record: column name → cell value, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` to `value`. An existing key keeps its position and the
    /// previous value is returned; a new key is appended.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Ordered rows plus the header they were read with.
///
/// `columns` survives even when there are no rows, so an empty export still
/// serializes with its header line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn with_columns(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Declared columns followed by any key a row carries that the header
    /// doesn't, in first-seen order.
    pub fn header(&self) -> Vec<String> {
        let mut header = self.columns.clone();
        for row in &self.rows {
            for key in row.keys() {
                if !header.iter().any(|h| h == key) {
                    header.push(key.to_string());
                }
            }
        }
        header
    }
}

/// Read `path`, normalize its header, tag every row with `status`, and
/// overwrite `path` with the result. Returns the number of rows written.
#[tracing::instrument(level = "info", skip(path, config), fields(path = %path.as_ref().display()))]
pub fn tag_file<P: AsRef<Path>>(path: P, status: &str, config: &Config) -> Result<usize> {
    let path = path.as_ref();
    let parsed = CsvReader::new(config.source_encoding)
        .normalized(config.collision_policy)
        .read_path(path)?;

    let tagged = tag_status(parsed.dataset, status);
    write_csv(&tagged, path).with_context(|| format!("rewriting {}", path.display()))?;

    info!(
        file = %file_label(path),
        rows = tagged.len(),
        status,
        "added status column"
    );
    Ok(tagged.len())
}

/// Concatenate the rows of `inputs`, in order, into a single CSV at `output`.
/// Every input is read before anything is written. Returns the row count.
#[tracing::instrument(level = "info", skip(inputs, output, config), fields(output = %output.as_ref().display()))]
pub fn merge_files<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs: &[P],
    output: Q,
    config: &Config,
) -> Result<usize> {
    let output = output.as_ref();
    let mut reader = CsvReader::new(config.source_encoding);
    if config.normalize_on_merge {
        reader = reader.normalized(config.collision_policy);
    }

    let mut datasets = Vec::with_capacity(inputs.len());
    for input in inputs {
        let input = input.as_ref();
        let parsed = reader.read_path(input)?;
        info!(
            file = %file_label(input),
            rows = parsed.dataset.len(),
            "collected rows"
        );
        datasets.push(parsed.dataset);
    }

    let merged = merge_datasets(datasets);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    write_csv(&merged, output)?;

    info!(rows = merged.len(), output = %output.display(), "merged CSV written");
    Ok(merged.len())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
