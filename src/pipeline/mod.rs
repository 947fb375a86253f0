// Data processing pipeline: ingestion, processing, and storage

pub mod ingestion;
pub mod loader;
pub mod processing;
pub mod report;
pub mod storage;

// Re-export key types from each stage
pub use loader::{IngestionPipeline, PreparedLoad};
pub use report::LoadReport;
