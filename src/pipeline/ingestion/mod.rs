// Pipeline ingestion: reading the raw source and locating its header

pub mod header;
pub mod source;

pub use header::{ColumnRole, HeaderLayout};
pub use source::{RawRow, RawTable, SourceReader};
