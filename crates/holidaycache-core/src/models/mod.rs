//! Data models for holiday calendars.
//!
//! - `HolidayRecord`, `HolidayType`: classification of a single day
//! - `YearDataset`: one year of explicit entries plus fetch metadata
//! - Upstream types: the JSON layouts published by the remote repository

pub mod dataset;
pub mod holiday;
pub mod upstream;

pub use dataset::YearDataset;
pub use holiday::{is_weekend, weekday_name, HolidayRecord, HolidayType, WEEKEND_NAME, WORKDAY_NAME};
pub use upstream::{HolidayCnDay, HolidayCnDocument, UpstreamDocument, UpstreamEntry};
