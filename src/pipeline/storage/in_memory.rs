use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::TractRepository;
use crate::common::error::Result;
use crate::domain::TractRecord;
use crate::pipeline::report::LoadReport;

#[derive(Default)]
struct State {
    records: Vec<TractRecord>,
    last_load: Option<LoadReport>,
    load_count: usize,
}

/// In-memory repository for development/testing
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every mutation is a plain assignment, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of loads recorded so far
    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }
}

#[async_trait]
impl TractRepository for InMemoryRepository {
    async fn replace_all(&self, records: &[TractRecord], report: &LoadReport) -> Result<()> {
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| a.key().cmp(&b.key()));

        let mut state = self.lock();
        state.records = sorted;
        state.last_load = Some(report.clone());
        state.load_count += 1;
        debug!("Replaced in-memory record set with {} records", state.records.len());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TractRecord>> {
        Ok(self.lock().records.clone())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.lock().records.len() as u64)
    }

    async fn last_load(&self) -> Result<Option<LoadReport>> {
        Ok(self.lock().last_load.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_only_the_latest_report() {
        let repo = InMemoryRepository::new();
        for version in 1..=3 {
            let mut report = LoadReport::new(None, format!("sha-{version}"));
            report.load_version = Some(version);
            repo.replace_all(&[], &report).await.unwrap();
        }

        assert_eq!(repo.load_count(), 3);
        let last = repo.last_load().await.unwrap().unwrap();
        assert_eq!(last.load_version, Some(3));
        assert_eq!(last.source_sha256, "sha-3");
    }
}
