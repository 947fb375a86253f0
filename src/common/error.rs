use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IgsError {
    /// The source could not be read as a tract table at all. Fatal for the load.
    #[error("Malformed source at row {row} (byte offset {byte_offset}): {message}")]
    MalformedSource {
        row: u64,
        byte_offset: u64,
        message: String,
    },

    #[error("No record for tract {tract_id}{}", year_suffix(.year))]
    NotFound { tract_id: String, year: Option<i32> },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid tract identifier: {0}")]
    InvalidTractId(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn year_suffix(year: &Option<i32>) -> String {
    match year {
        Some(y) => format!(" in year {y}"),
        None => String::new(),
    }
}

impl IgsError {
    /// Stable machine-readable code used by the HTTP and GraphQL layers
    pub fn code(&self) -> &'static str {
        match self {
            IgsError::MalformedSource { .. } => "MALFORMED_SOURCE",
            IgsError::NotFound { .. } => "NOT_FOUND",
            IgsError::UnknownMetric(_) => "UNKNOWN_METRIC",
            IgsError::InvalidTractId(_) => "INVALID_TRACT_ID",
            IgsError::InvalidQuery(_) => "INVALID_QUERY",
            _ => "INTERNAL",
        }
    }

    /// True for errors caused by the caller rather than by the system
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            IgsError::UnknownMetric(_) | IgsError::InvalidTractId(_) | IgsError::InvalidQuery(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IgsError>;

/// A single source row dropped during ingestion. Never propagated as an
/// `Err`; collected into the load report instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejectedError {
    /// 1-based physical row number in the source file
    pub row_number: u64,
    pub byte_offset: u64,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    MalformedTractId { value: String },
    InvalidYear { value: String },
    YearOutOfRange { year: i32, min: i32, max: i32 },
    MissingField { field: String },
    ColumnCount { expected: usize, found: usize },
}

impl RejectionReason {
    /// Short label used for the per-reason summary in load reports
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::MalformedTractId { .. } => "malformed_tract_id",
            RejectionReason::InvalidYear { .. } => "invalid_year",
            RejectionReason::YearOutOfRange { .. } => "year_out_of_range",
            RejectionReason::MissingField { .. } => "missing_field",
            RejectionReason::ColumnCount { .. } => "column_count",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::MalformedTractId { value } => {
                write!(f, "malformed tract identifier '{value}'")
            }
            RejectionReason::InvalidYear { value } => write!(f, "unparseable year '{value}'"),
            RejectionReason::YearOutOfRange { year, min, max } => {
                write!(f, "year {year} outside {min}-{max}")
            }
            RejectionReason::MissingField { field } => write!(f, "missing required field '{field}'"),
            RejectionReason::ColumnCount { expected, found } => {
                write!(f, "expected {expected} columns, found {found}")
            }
        }
    }
}

impl std::fmt::Display for RowRejectedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "row {} (byte offset {}) rejected: {}",
            self.row_number, self.byte_offset, self.reason
        )
    }
}

impl std::error::Error for RowRejectedError {}
