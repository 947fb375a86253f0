// Persistence for tract records and the in-process snapshot readers query

pub mod in_memory;
pub mod snapshot;
pub mod sqlite;

use async_trait::async_trait;

use crate::common::error::Result;
use crate::domain::TractRecord;
use crate::pipeline::report::LoadReport;

pub use in_memory::InMemoryRepository;
pub use snapshot::{SnapshotStore, TractSnapshot};
pub use sqlite::SqliteRepository;

/// Durable home of the materialized record set.
///
/// Loads are wholesale: `replace_all` swaps the entire record set and either
/// fully succeeds or leaves the previous contents untouched.
#[async_trait]
pub trait TractRepository: Send + Sync {
    async fn replace_all(&self, records: &[TractRecord], report: &LoadReport) -> Result<()>;

    /// All records sorted by `(tract_id, year)`
    async fn load_all(&self) -> Result<Vec<TractRecord>>;

    async fn count(&self) -> Result<u64>;

    /// Report of the most recent successful load
    async fn last_load(&self) -> Result<Option<LoadReport>>;
}
