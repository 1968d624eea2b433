//! Date classification on top of the cache.
//!
//! `HolidayResolver::resolve` never fails for a valid date. Explicit dataset
//! entries win; unlisted days follow the weekday/weekend rule; a year that is
//! not cached is fetched once (single-flight per year) and, if that fails,
//! the answer degrades to `type: unknown` with the weekday/weekend rule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{DatasetSource, FetchError};
use crate::cache::CacheManager;
use crate::models::{weekday_name, HolidayRecord, YearDataset};

/// How long a failed fetch is remembered before the year is tried again.
const FAILED_FETCH_RETRY_MINUTES: u64 = 10;

/// Why a resolution could not use authoritative data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DegradedResolution {
    #[error("no holiday data published for {year}; weekday/weekend rule applied")]
    NotPublished { year: i32 },

    #[error("holiday data for {year} is unavailable ({reason}); weekday/weekend rule applied")]
    Unavailable { year: i32, reason: String },
}

impl DegradedResolution {
    fn from_fetch_error(year: i32, error: &FetchError) -> Self {
        if error.is_not_found() {
            DegradedResolution::NotPublished { year }
        } else {
            DegradedResolution::Unavailable {
                year,
                reason: error.to_string(),
            }
        }
    }
}

/// Outcome of resolving one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    #[serde(flatten)]
    pub record: HolidayRecord,
    pub weekday: &'static str,
    pub year: i32,
    #[serde(rename = "warning", skip_serializing_if = "Option::is_none", serialize_with = "display_opt")]
    pub degraded: Option<DegradedResolution>,
}

fn display_opt<S: serde::Serializer>(
    value: &Option<DegradedResolution>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(reason) => serializer.collect_str(reason),
        None => serializer.serialize_none(),
    }
}

impl Resolution {
    fn new(record: HolidayRecord, degraded: Option<DegradedResolution>) -> Self {
        Self {
            weekday: weekday_name(record.date),
            year: record.date.year(),
            record,
            degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Parse a strict `YYYY-MM-DD` date (zero-padded, exactly ten characters).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 {
        return None;
    }
    let well_formed = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !well_formed {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn lookup(dataset: &YearDataset, date: NaiveDate) -> HolidayRecord {
    dataset
        .get(date)
        .cloned()
        .unwrap_or_else(|| HolidayRecord::default_for(date))
}

type FetchResult = Result<Arc<YearDataset>, DegradedResolution>;

/// Result slot of an on-demand fetch; `None` until the fetch settles.
type FetchSlot = watch::Receiver<Option<FetchResult>>;

enum FetchRole {
    Leader(watch::Sender<Option<FetchResult>>),
    Follower(FetchSlot),
}

/// Removes a year's in-flight slot when its fetch ends, even if cancelled.
struct InflightGuard<'a> {
    inflight: &'a Mutex<HashMap<i32, FetchSlot>>,
    year: i32,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.year);
    }
}

pub struct HolidayResolver {
    cache: Arc<CacheManager>,
    source: Arc<dyn DatasetSource>,
    /// Years being fetched on demand; late arrivals wait on the slot.
    inflight: Mutex<HashMap<i32, FetchSlot>>,
    recent_failures: Mutex<HashMap<i32, (Instant, DegradedResolution)>>,
    failure_ttl: Duration,
}

impl HolidayResolver {
    pub fn new(cache: Arc<CacheManager>, source: Arc<dyn DatasetSource>) -> Self {
        Self {
            cache,
            source,
            inflight: Mutex::new(HashMap::new()),
            recent_failures: Mutex::new(HashMap::new()),
            failure_ttl: Duration::from_secs(FAILED_FETCH_RETRY_MINUTES * 60),
        }
    }

    /// Override how long a failed year is left alone before refetching.
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    pub async fn resolve(&self, date: NaiveDate) -> Resolution {
        let year = date.year();

        if let Some(dataset) = self.cache.get(year) {
            return Resolution::new(lookup(&dataset, date), None);
        }

        match self.ensure_year(year).await {
            Ok(dataset) => Resolution::new(lookup(&dataset, date), None),
            Err(reason) => {
                debug!(%date, reason = %reason, "Degraded resolution");
                Resolution::new(HolidayRecord::unknown(date), Some(reason))
            }
        }
    }

    fn recent_failure(&self, year: i32) -> Option<DegradedResolution> {
        let mut failures = self
            .recent_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match failures.get(&year) {
            Some((at, reason)) if at.elapsed() < self.failure_ttl => Some(reason.clone()),
            Some(_) => {
                failures.remove(&year);
                None
            }
            None => None,
        }
    }

    fn remember_failure(&self, year: i32, reason: DegradedResolution) {
        self.recent_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(year, (Instant::now(), reason));
    }

    /// Fetch and cache `year`, or join a fetch already in progress.
    async fn ensure_year(&self, year: i32) -> FetchResult {
        loop {
            let role = {
                let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(dataset) = self.cache.get(year) {
                    return Ok(dataset);
                }
                if let Some(reason) = self.recent_failure(year) {
                    return Err(reason);
                }
                match inflight.get(&year) {
                    Some(slot) => FetchRole::Follower(slot.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(year, rx);
                        FetchRole::Leader(tx)
                    }
                }
            };

            match role {
                FetchRole::Leader(tx) => {
                    let _guard = InflightGuard {
                        inflight: &self.inflight,
                        year,
                    };
                    let result = self.fetch_and_store(year).await;
                    tx.send_replace(Some(result.clone()));
                    return result;
                }
                FetchRole::Follower(mut slot) => {
                    let settled = slot
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|result| (*result).clone());
                    if let Some(result) = settled {
                        return result;
                    }
                    // Leader was cancelled before settling; take over
                    debug!(year, "On-demand fetch abandoned, retrying");
                }
            }
        }
    }

    async fn fetch_and_store(&self, year: i32) -> FetchResult {
        info!(year, "Year not cached, fetching on demand");
        match self.source.fetch(year).await {
            Ok(dataset) => {
                let dataset = Arc::new(dataset);
                match self.cache.put(year, (*dataset).clone()) {
                    Ok(()) => Ok(self.cache.get(year).unwrap_or(dataset)),
                    Err(e) => {
                        // Serve what we fetched; a later lookup will try again
                        warn!(year, error = %format!("{:#}", e), "Failed to cache fetched dataset");
                        Ok(dataset)
                    }
                }
            }
            Err(e) => {
                if e.is_not_found() {
                    info!(year, error = %e, "No dataset available");
                } else {
                    warn!(year, error = %e, "On-demand fetch failed");
                }
                let reason = DegradedResolution::from_fetch_error(year, &e);
                self.remember_failure(year, reason.clone());
                Err(reason)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
