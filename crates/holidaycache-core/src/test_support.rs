//! In-memory `DatasetSource` for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::api::{DatasetSource, FetchError, FetchOutcome};
use crate::models::YearDataset;

#[derive(Default)]
pub struct FakeSource {
    datasets: HashMap<i32, YearDataset>,
    broken: HashSet<i32>,
    delay: Duration,
    calls: Mutex<HashMap<i32, usize>>,
    total: AtomicUsize,
    versions_sent: Mutex<HashMap<i32, Vec<Option<String>>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset: YearDataset) -> Self {
        self.datasets.insert(dataset.year, dataset);
        self
    }

    /// Requests for `year` fail with a transient server error.
    pub fn with_broken_year(mut self, year: i32) -> Self {
        self.broken.insert(year);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls_for(&self, year: i32) -> usize {
        self.calls.lock().unwrap().get(&year).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Version markers passed to `fetch_if_changed` for `year`, in order.
    pub fn versions_sent(&self, year: i32) -> Vec<Option<String>> {
        self.versions_sent.lock().unwrap().get(&year).cloned().unwrap_or_default()
    }

    async fn serve(&self, year: i32) -> Result<YearDataset, FetchError> {
        *self.calls.lock().unwrap().entry(year).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.broken.contains(&year) {
            return Err(FetchError::Server("Status 503: unavailable".to_string()));
        }
        self.datasets
            .get(&year)
            .cloned()
            .ok_or(FetchError::NotFound(year))
    }
}

impl DatasetSource for FakeSource {
    fn fetch(&self, year: i32) -> BoxFuture<'_, Result<YearDataset, FetchError>> {
        Box::pin(self.serve(year))
    }

    /// Answers `NotModified` when `version` matches the dataset's
    /// `source_version`, like an ETag match.
    fn fetch_if_changed<'a>(
        &'a self,
        year: i32,
        version: Option<&'a str>,
    ) -> BoxFuture<'a, Result<FetchOutcome, FetchError>> {
        Box::pin(async move {
            self.versions_sent
                .lock()
                .unwrap()
                .entry(year)
                .or_default()
                .push(version.map(str::to_string));
            let dataset = self.serve(year).await?;
            match (version, dataset.source_version.as_deref()) {
                (Some(sent), Some(current)) if sent == current => Ok(FetchOutcome::NotModified),
                _ => Ok(FetchOutcome::Fetched(dataset)),
            }
        })
    }
}
