//! Daily cache refresh.
//!
//! The scheduler refreshes the current and next year once a day at a fixed
//! wall-clock time, once at startup when either is missing, and on demand.
//! Runs never overlap: a trigger that arrives during a run is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{DatasetSource, FetchOutcome};
use crate::cache::CacheManager;
use crate::config::ScheduleConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedYear {
    pub year: i32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub updated: Vec<i32>,
    pub unchanged: Vec<i32>,
    pub failed: Vec<FailedYear>,
}

enum YearOutcome {
    Updated,
    Unchanged,
    Failed(String),
}

/// Years kept warm: the current one plus one year of look-ahead.
pub fn target_years(today: NaiveDate) -> Vec<i32> {
    vec![today.year(), today.year() + 1]
}

/// First occurrence of `hour:minute` strictly after `now`, in `now`'s offset.
pub fn next_run_after(now: DateTime<FixedOffset>, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    let slot = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    let offset = *now.offset();
    let mut day = now.date_naive();
    loop {
        // Fixed offsets have no gaps or folds, so this is always Single
        if let Some(candidate) = offset.from_local_datetime(&day.and_time(slot)).single() {
            if candidate > now {
                return candidate;
            }
        }
        day = day.succ_opt().unwrap_or(day);
    }
}

/// Resets the running flag when a run ends, even if the run task panics.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshScheduler {
    cache: Arc<CacheManager>,
    source: Arc<dyn DatasetSource>,
    settings: ScheduleConfig,
    running: AtomicBool,
}

impl RefreshScheduler {
    pub fn new(cache: Arc<CacheManager>, source: Arc<dyn DatasetSource>, settings: ScheduleConfig) -> Self {
        Self {
            cache,
            source,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.settings.utc_offset)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Years that should be fetched at startup because they are not cached.
    pub fn missing_at_startup(&self, today: NaiveDate) -> Vec<i32> {
        let targets = target_years(today);
        let last = today.year() + 1;
        let first = self
            .settings
            .prefetch_from_year
            .map_or(today.year(), |from| from.min(today.year()));

        let mut missing: Vec<i32> = (first..=last).filter(|y| !self.cache.contains(*y)).collect();
        // A missing target triggers a full refresh of all targets
        if targets.iter().any(|y| missing.contains(y)) {
            for year in targets {
                if !missing.contains(&year) {
                    missing.push(year);
                }
            }
        }
        missing.sort_unstable();
        missing
    }

    /// Refresh `years` unless a run is already in progress (then `None`).
    ///
    /// Each year is refreshed independently; a failure leaves that year's
    /// previous data in place and does not stop the others.
    pub async fn try_run(&self, years: &[i32], force: bool) -> Option<RefreshReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Refresh already running, skipping trigger");
            return None;
        }
        let _guard = RunGuard(&self.running);

        info!(years = ?years, force, "Refresh started");
        let mut report = RefreshReport::default();
        for &year in years {
            match self.refresh_year(year, force).await {
                YearOutcome::Updated => report.updated.push(year),
                YearOutcome::Unchanged => report.unchanged.push(year),
                YearOutcome::Failed(error) => report.failed.push(FailedYear { year, error }),
            }
        }
        info!(
            updated = ?report.updated,
            unchanged = ?report.unchanged,
            failed = report.failed.len(),
            "Refresh finished"
        );
        Some(report)
    }

    /// Refresh the current and next year.
    pub async fn refresh_targets(&self, force: bool) -> Option<RefreshReport> {
        self.try_run(&target_years(self.today()), force).await
    }

    async fn refresh_year(&self, year: i32, force: bool) -> YearOutcome {
        let cached_version = if force {
            None
        } else {
            self.cache.get(year).and_then(|d| d.source_version.clone())
        };

        match self.source.fetch_if_changed(year, cached_version.as_deref()).await {
            Ok(FetchOutcome::NotModified) => {
                debug!(year, "Dataset unchanged");
                YearOutcome::Unchanged
            }
            Ok(FetchOutcome::Fetched(dataset)) => {
                let current = if force { None } else { self.cache.get(year) };
                if let Some(current) = current.filter(|c| c.records == dataset.records) {
                    if current.source_version == dataset.source_version {
                        debug!(year, "Dataset content unchanged");
                        return YearOutcome::Unchanged;
                    }
                    // Same records under a new ETag; keep it for the next conditional request
                    match self.cache.put(year, dataset) {
                        Ok(()) => debug!(year, "Dataset version marker updated"),
                        Err(e) => warn!(year, error = %format!("{:#}", e), "Failed to store new version marker"),
                    }
                    return YearOutcome::Unchanged;
                }
                match self.cache.put(year, dataset) {
                    Ok(()) => {
                        info!(year, "Dataset refreshed");
                        YearOutcome::Updated
                    }
                    Err(e) => {
                        error!(year, error = %format!("{:#}", e), "Failed to store refreshed dataset");
                        YearOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                if e.is_not_found() {
                    info!(year, error = %e, "Dataset not available yet");
                } else {
                    warn!(year, error = %e, "Refresh failed, keeping cached data");
                }
                YearOutcome::Failed(e.to_string())
            }
        }
    }

    /// Startup refresh (if needed) followed by the daily timer loop.
    /// Returns once `shutdown` flips to `true`; a run in progress is finished first.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let missing = self.missing_at_startup(self.today());
        if !missing.is_empty() {
            info!(years = ?missing, "Years missing from cache, refreshing at startup");
            self.try_run(&missing, false).await;
        }

        info!(
            hour = self.settings.hour,
            minute = self.settings.minute,
            utc_offset = %self.settings.utc_offset,
            "Daily refresh scheduled"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = self.now();
            let next = next_run_after(now, self.settings.hour, self.settings.minute);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next_run = %next, "Waiting for next refresh");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.refresh_targets(false).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped
                        break;
                    }
                }
            }
        }
        info!("Refresh scheduler stopped");
    }

    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let me = Arc::clone(self);
        tokio::spawn(me.run(shutdown))
    }
}

// ============================================================================
// Tests
// ============================================================================
