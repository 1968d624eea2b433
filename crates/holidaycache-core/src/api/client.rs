//! HTTP client for the remote holiday dataset repository.
//!
//! This module provides the `DatasetSource` trait used by the cache layers
//! and `HolidayClient`, its HTTP implementation with mirror fallback,
//! retry with exponential backoff and conditional (ETag) requests.

use std::collections::HashSet;
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use futures::future::BoxFuture;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::models::{is_weekend, HolidayRecord, HolidayType, UpstreamDocument, YearDataset};

use super::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

const USER_AGENT: &str = "holidaycache-fetcher";

/// Placeholder substituted with the four-digit year in mirror URL templates.
pub const YEAR_PLACEHOLDER: &str = "{year}";

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    /// 3 attempts, backing off 1s then 2s (capped at 4s).
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. Only `FetchError::is_retryable` errors back off.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    target_url = label,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Fetch failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Source abstraction
// ============================================================================

#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(YearDataset),
    /// The source confirmed the cached version is current.
    NotModified,
}

/// Anything that can produce a year's dataset.
pub trait DatasetSource: Send + Sync {
    fn fetch(&self, year: i32) -> BoxFuture<'_, Result<YearDataset, FetchError>>;

    /// Conditional fetch against a previously seen version marker.
    /// Sources without version support always fetch.
    fn fetch_if_changed<'a>(
        &'a self,
        year: i32,
        _version: Option<&'a str>,
    ) -> BoxFuture<'a, Result<FetchOutcome, FetchError>> {
        Box::pin(async move { self.fetch(year).await.map(FetchOutcome::Fetched) })
    }
}

enum MirrorResponse {
    Body { text: String, etag: Option<String> },
    NotModified,
}

// ============================================================================
// HTTP client
// ============================================================================

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HolidayClient {
    client: Client,
    mirrors: Vec<String>,
    token: Option<String>,
    earliest_year: i32,
    lookahead_years: i32,
    utc_offset: FixedOffset,
    retry: RetryPolicy,
}

impl HolidayClient {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            mirrors: config.mirrors.clone(),
            token: config.github_token.clone(),
            earliest_year: config.earliest_year,
            lookahead_years: config.lookahead_years,
            utc_offset: config.utc_offset,
            retry: config.retry,
        })
    }

    /// Years the remote repository can be asked for.
    pub fn supported_years(&self) -> RangeInclusive<i32> {
        self.supported_years_at(Utc::now())
    }

    /// The current year is taken in the configured offset, not UTC.
    pub fn supported_years_at(&self, now: DateTime<Utc>) -> RangeInclusive<i32> {
        let current = now.with_timezone(&self.utc_offset).year();
        self.earliest_year..=current + self.lookahead_years
    }

    pub fn mirror_url(template: &str, year: i32) -> String {
        template.replace(YEAR_PLACEHOLDER, &year.to_string())
    }

    async fn get_once(
        &self,
        year: i32,
        url: &str,
        version: Option<&str>,
    ) -> Result<MirrorResponse, FetchError> {
        let mut request = self.client.get(url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        if let Some(version) = version {
            request = request.header(header::IF_NONE_MATCH, version);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(MirrorResponse::NotModified);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(year, status, &body));
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;
        Ok(MirrorResponse::Body { text, etag })
    }

    async fn fetch_from_mirrors(
        &self,
        year: i32,
        version: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        if !self.supported_years().contains(&year) {
            return Err(FetchError::UnsupportedYear(year));
        }

        let mut last_error: Option<FetchError> = None;

        for template in &self.mirrors {
            let url = Self::mirror_url(template, year);
            debug!(year, url = %url, "Fetching holiday dataset");

            let result = with_retry(self.retry, &url, || self.get_once(year, &url, version)).await;

            match result {
                Ok(MirrorResponse::NotModified) => {
                    debug!(year, url = %url, "Dataset not modified");
                    return Ok(FetchOutcome::NotModified);
                }
                Ok(MirrorResponse::Body { text, etag }) => match parse_dataset(year, &text, etag) {
                    Ok(dataset) => return Ok(FetchOutcome::Fetched(dataset)),
                    Err(e) => {
                        warn!(year, url = %url, error = %e, "Mirror returned an invalid dataset");
                        last_error = Some(e);
                    }
                },
                Err(FetchError::NotFound(_)) => {
                    debug!(year, url = %url, "Dataset not published on mirror");
                }
                Err(e) => {
                    warn!(year, url = %url, error = %e, "Mirror fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(FetchError::NotFound(year)))
    }
}

impl DatasetSource for HolidayClient {
    fn fetch(&self, year: i32) -> BoxFuture<'_, Result<YearDataset, FetchError>> {
        Box::pin(async move {
            match self.fetch_from_mirrors(year, None).await? {
                FetchOutcome::Fetched(dataset) => Ok(dataset),
                // Unconditional requests never carry If-None-Match
                FetchOutcome::NotModified => Err(FetchError::Server(
                    "unexpected 304 for unconditional request".to_string(),
                )),
            }
        })
    }

    fn fetch_if_changed<'a>(
        &'a self,
        year: i32,
        version: Option<&'a str>,
    ) -> BoxFuture<'a, Result<FetchOutcome, FetchError>> {
        Box::pin(self.fetch_from_mirrors(year, version))
    }
}

// ============================================================================
// Payload parsing
// ============================================================================

fn parse_entry_date(year: i32, raw: &str) -> Result<NaiveDate, FetchError> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| FetchError::parse(year, format!("bad date {:?}: {}", raw, e)))?;
    if date.year() != year {
        return Err(FetchError::parse(
            year,
            format!("date {} does not belong to {}", raw, year),
        ));
    }
    Ok(date)
}

/// Parse and validate one year's upstream document.
///
/// Every date must parse and fall inside `year`; duplicate dates and the
/// `unknown` type are rejected.
pub fn parse_dataset(year: i32, body: &str, version: Option<String>) -> Result<YearDataset, FetchError> {
    let document: UpstreamDocument = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(year, e.to_string()))?;

    let mut records = Vec::new();
    match document {
        UpstreamDocument::HolidayCn(doc) => {
            if let Some(doc_year) = doc.year {
                if doc_year != year {
                    return Err(FetchError::parse(
                        year,
                        format!("document is for {}", doc_year),
                    ));
                }
            }
            for day in doc.days {
                let date = parse_entry_date(year, &day.date)?;
                let kind = if day.is_off_day {
                    HolidayType::Statutory
                } else if is_weekend(date) {
                    HolidayType::AdjustedWorkday
                } else {
                    HolidayType::None
                };
                records.push(HolidayRecord::new(date, day.name, kind));
            }
        }
        UpstreamDocument::Mapping(entries) => {
            for (raw_date, entry) in entries {
                let date = parse_entry_date(year, &raw_date)?;
                if entry.kind == HolidayType::Unknown {
                    return Err(FetchError::parse(
                        year,
                        format!("entry {} has type unknown", raw_date),
                    ));
                }
                records.push(HolidayRecord::new(date, entry.name, entry.kind));
            }
        }
    }

    let mut seen = HashSet::new();
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.date)) {
        return Err(FetchError::parse(year, format!("duplicate entry for {}", dup.date)));
    }

    Ok(YearDataset::new(year, records, version))
}

// ============================================================================
// Tests
// ============================================================================
