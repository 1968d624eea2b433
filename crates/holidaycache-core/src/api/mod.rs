//! Dataset fetching from the remote holiday repository.
//!
//! This module provides the `DatasetSource` abstraction and `HolidayClient`,
//! which downloads one year's JSON document over HTTP. Mirrors are tried in
//! order; transient failures are retried with exponential backoff.

pub mod client;
pub mod error;

pub use client::{parse_dataset, with_retry, DatasetSource, FetchOutcome, HolidayClient, RetryPolicy};
pub use error::FetchError;
