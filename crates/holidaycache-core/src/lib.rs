//! holidaycache core - yearly holiday datasets fetched from a remote
//! repository, cached on disk, refreshed daily and served by date.
//!
//! The pieces, leaf-first:
//! - [`api`]: `HolidayClient` downloads one year's JSON document
//! - [`cache`]: `CacheManager` keeps one file per year plus an in-memory copy
//! - [`resolver`]: `HolidayResolver` classifies a date, fetching missing years once
//! - [`scheduler`]: `RefreshScheduler` refreshes the current and next year daily

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use api::{DatasetSource, FetchError, FetchOutcome, HolidayClient};
pub use cache::{CacheIndex, CacheManager};
pub use config::Config;
pub use models::{HolidayRecord, HolidayType, YearDataset};
pub use resolver::{parse_date, DegradedResolution, HolidayResolver, Resolution};
pub use scheduler::{RefreshReport, RefreshScheduler};
