use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::{fs, path::Path};
use tracing::{debug, warn};

use super::{normalize::normalize_columns, Dataset, Row};
use crate::config::{CollisionPolicy, SourceEncoding};

/// A data line whose field count disagreed with the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMismatch {
    /// 1-based physical line where the record starts.
    pub line: u64,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Default)]
pub struct ParsedCsv {
    pub dataset: Dataset,
    pub mismatches: Vec<ColumnMismatch>,
}

/// Decodes an export in the caller's encoding and parses it into rows keyed
/// by the first line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader {
    encoding: SourceEncoding,
    normalize: Option<CollisionPolicy>,
}

impl CsvReader {
    pub fn new(encoding: SourceEncoding) -> Self {
        Self {
            encoding,
            normalize: None,
        }
    }

    /// Slug the header before rows are keyed, so duplicate names are
    /// resolved by `policy` instead of overwriting each other.
    pub fn normalized(mut self, policy: CollisionPolicy) -> Self {
        self.normalize = Some(policy);
        self
    }

    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<ParsedCsv> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        self.parse_bytes(&bytes, &path.display().to_string())
            .with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse_bytes(&self, bytes: &[u8], source: &str) -> Result<ParsedCsv> {
        let text = decode(bytes, self.encoding);
        self.parse_str(&text, source)
    }

    /// `source` only labels log lines.
    pub fn parse_str(&self, content: &str, source: &str) -> Result<ParsedCsv> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let raw_header: Vec<String> = rdr
            .headers()
            .context("reading CSV header")?
            .iter()
            .map(str::to_string)
            .collect();
        let header = match self.normalize {
            Some(policy) => normalize_columns(&raw_header, policy)?,
            None => {
                warn_on_duplicate_header(&raw_header, source);
                raw_header
            }
        };

        let mut parsed = ParsedCsv::default();
        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        let mut idx = 0usize;
        loop {
            let more = rdr
                .read_record(&mut record)
                .with_context(|| format!("CSV parse error at record {}", idx + 1))?;
            if !more {
                break;
            }
            idx += 1;

            // raw text of this record, including any empty lines csv skipped
            // ahead of it
            let start = record.position().map(|p| p.byte() as usize).unwrap_or(0);
            let end = rdr.position().byte() as usize;
            let raw = content.get(start..end).unwrap_or("");
            if raw.trim().is_empty() {
                continue;
            }

            if record.len() != header.len() {
                let skipped = raw.len() - raw.trim_start_matches(['\r', '\n']).len();
                let line = physical_line(content, start + skipped);
                warn!(
                    source,
                    line,
                    expected = header.len(),
                    actual = record.len(),
                    "column count mismatch"
                );
                parsed.mismatches.push(ColumnMismatch {
                    line,
                    expected: header.len(),
                    actual: record.len(),
                });
            }

            let row: Row = header
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.as_str(), v))
                .collect();
            rows.push(row);
        }

        debug!(source, rows = rows.len(), columns = header.len(), "parsed CSV");
        parsed.dataset = Dataset::with_columns(header, rows);
        Ok(parsed)
    }
}

/// Decode `bytes` from `encoding`, dropping a leading BOM. Malformed
/// sequences become U+FFFD instead of failing the run.
pub fn decode(bytes: &[u8], encoding: SourceEncoding) -> String {
    let (text, had_errors) = encoding.encoding().decode_with_bom_removal(bytes);
    if had_errors {
        warn!(
            encoding = encoding.name(),
            "input contained byte sequences invalid for its encoding"
        );
    }
    text.into_owned()
}

/// 1-based line number of the byte at `offset`.
fn physical_line(content: &str, offset: usize) -> u64 {
    let offset = offset.min(content.len());
    content.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u64
        + 1
}

fn warn_on_duplicate_header(header: &[String], source: &str) {
    for (idx, name) in header.iter().enumerate() {
        if header[..idx].contains(name) {
            warn!(source, column = %name, "duplicate column name; later values win");
        }
    }
}
