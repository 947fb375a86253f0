use csv::{ByteRecord, ReaderBuilder};
use tracing::debug;

use super::header::HeaderLayout;
use crate::common::error::{IgsError, Result};
use crate::domain::MetricCatalog;

/// One data row after the header, cells trimmed and lossily decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line number where the record starts
    pub row_number: u64,
    pub byte_offset: u64,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn cell(&self, idx: usize) -> &str {
        self.cells.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// The source split into header layout and data rows
#[derive(Debug, Clone)]
pub struct RawTable {
    pub layout: HeaderLayout,
    pub header_row: u64,
    /// Byte offset just past the header row
    pub data_offset: u64,
    /// Metadata rows (category headers, titles) before the header
    pub header_rows_skipped: u64,
    /// All-blank rows after the header
    pub blank_rows_skipped: u64,
    pub rows: Vec<RawRow>,
}

/// Reads a delimited source whose header block has an unknown length
pub struct SourceReader<'a> {
    catalog: &'a MetricCatalog,
    header_scan_limit: usize,
    delimiter: u8,
}

impl<'a> SourceReader<'a> {
    pub fn new(catalog: &'a MetricCatalog, header_scan_limit: usize) -> Self {
        Self {
            catalog,
            header_scan_limit,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn read(&self, bytes: &[u8]) -> Result<RawTable> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(bytes);

        let mut record = ByteRecord::new();
        let mut scanned = 0usize;
        let mut last_row = 0u64;
        let mut last_offset = 0u64;
        let mut header: Option<(HeaderLayout, u64)> = None;

        // Header scan
        while scanned < self.header_scan_limit {
            if !reader.read_byte_record(&mut record)? {
                break;
            }
            let (row, offset) = position_of(&record);
            last_row = row;
            last_offset = offset;
            scanned += 1;

            let cells = decode(&record, scanned == 1);
            if let Some(layout) = HeaderLayout::detect(&cells, self.catalog) {
                header = Some((layout, row));
                break;
            }
        }

        let (layout, header_row) = match header {
            Some(found) => found,
            None if scanned == 0 => {
                return Err(IgsError::MalformedSource {
                    row: 0,
                    byte_offset: 0,
                    message: "source is empty".to_string(),
                })
            }
            None => {
                return Err(IgsError::MalformedSource {
                    row: last_row,
                    byte_offset: last_offset,
                    message: format!(
                        "no header row with tract id, year, county and state columns in the first {} rows",
                        scanned
                    ),
                })
            }
        };
        let header_rows_skipped = (scanned - 1) as u64;
        let data_offset = reader.position().byte();
        debug!(
            "Header found at row {} after skipping {} metadata rows ({} columns)",
            header_row,
            header_rows_skipped,
            layout.width()
        );

        let mut rows = Vec::new();
        let mut blank_rows_skipped = 0u64;
        while reader.read_byte_record(&mut record)? {
            let (row_number, byte_offset) = position_of(&record);
            let cells = decode(&record, false);
            if cells.iter().all(|c| c.is_empty()) {
                blank_rows_skipped += 1;
                continue;
            }
            rows.push(RawRow {
                row_number,
                byte_offset,
                cells,
            });
        }

        Ok(RawTable {
            layout,
            header_row,
            data_offset,
            header_rows_skipped,
            blank_rows_skipped,
            rows,
        })
    }
}

fn position_of(record: &ByteRecord) -> (u64, u64) {
    record
        .position()
        .map(|p| (p.line(), p.byte()))
        .unwrap_or((0, 0))
}

fn decode(record: &ByteRecord, first_row: bool) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let raw = String::from_utf8_lossy(field);
            let text: &str = if first_row && idx == 0 {
                raw.trim_start_matches('\u{feff}')
            } else {
                raw.as_ref()
            };
            text.trim().to_string()
        })
        .collect()
}
