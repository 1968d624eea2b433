//! Service configuration.
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! by the binary before this runs). Invalid values are startup errors.
//!
//! The daily refresh time is interpreted in a fixed UTC offset,
//! `REFRESH_UTC_OFFSET`, which defaults to `+08:00` (China Standard Time).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;

use crate::api::client::{RetryPolicy, YEAR_PLACEHOLDER};

/// Default on-disk location of the per-year cache files
const DEFAULT_CACHE_DIR: &str = "data/holidays";

const DEFAULT_GH_OWNER: &str = "NateScarlet";
const DEFAULT_GH_REPO: &str = "holiday-cn";
const DEFAULT_GH_BRANCH: &str = "master";

/// First year published by the upstream repository
const DEFAULT_EARLIEST_YEAR: i32 = 2007;

const DEFAULT_REFRESH_HOUR: u32 = 3;
const DEFAULT_REFRESH_MINUTE: u32 = 0;
const DEFAULT_UTC_OFFSET: &str = "+08:00";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:12081";

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// URL templates containing `{year}`, tried in order
    pub mirrors: Vec<String>,
    pub github_token: Option<String>,
    pub earliest_year: i32,
    /// How many years past the current one may be requested
    pub lookahead_years: i32,
    /// Offset that decides which year is "current"; same as the refresh schedule
    pub utc_offset: FixedOffset,
    pub retry: RetryPolicy,
}

impl SourceConfig {
    /// raw.githubusercontent.com first, jsDelivr as fallback.
    pub fn github_mirrors(owner: &str, repo: &str, branch: &str, path: &str) -> Vec<String> {
        let path = path.trim_matches('/');
        let inner = if path.is_empty() {
            format!("{}.json", YEAR_PLACEHOLDER)
        } else {
            format!("{}/{}.json", path, YEAR_PLACEHOLDER)
        };
        vec![
            format!("https://raw.githubusercontent.com/{}/{}/{}/{}", owner, repo, branch, inner),
            format!("https://cdn.jsdelivr.net/gh/{}/{}@{}/{}", owner, repo, branch, inner),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
    pub utc_offset: FixedOffset,
    /// At startup, also fetch any missing year from this one onwards
    pub prefetch_from_year: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub source: SourceConfig,
    pub schedule: ScheduleConfig,
    pub bind_addr: String,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cache_dir = var("HOLIDAY_JSON_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        let mirrors = SourceConfig::github_mirrors(
            &var("HOLIDAY_GH_OWNER").unwrap_or_else(|| DEFAULT_GH_OWNER.to_string()),
            &var("HOLIDAY_GH_REPO").unwrap_or_else(|| DEFAULT_GH_REPO.to_string()),
            &var("HOLIDAY_GH_BRANCH").unwrap_or_else(|| DEFAULT_GH_BRANCH.to_string()),
            &var("HOLIDAY_GH_PATH").unwrap_or_default(),
        );

        let max_attempts: u32 = parse_or(var("HOLIDAY_FETCH_ATTEMPTS"), "HOLIDAY_FETCH_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            bail!("HOLIDAY_FETCH_ATTEMPTS must be at least 1");
        }

        let utc_offset = parse_utc_offset(
            &var("REFRESH_UTC_OFFSET").unwrap_or_else(|| DEFAULT_UTC_OFFSET.to_string()),
        )?;

        let source = SourceConfig {
            mirrors,
            github_token: var("GITHUB_TOKEN"),
            earliest_year: parse_or(var("HOLIDAY_EARLIEST_YEAR"), "HOLIDAY_EARLIEST_YEAR", DEFAULT_EARLIEST_YEAR)?,
            lookahead_years: 1,
            utc_offset,
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(4),
            },
        };

        let hour = parse_or(var("REFRESH_HOUR"), "REFRESH_HOUR", DEFAULT_REFRESH_HOUR)?;
        let minute = parse_or(var("REFRESH_MIN"), "REFRESH_MIN", DEFAULT_REFRESH_MINUTE)?;
        if hour > 23 || minute > 59 {
            bail!("Invalid daily refresh time {:02}:{:02}", hour, minute);
        }

        let prefetch_from_year = var("HOLIDAY_PREFETCH_FROM")
            .map(|v| v.parse::<i32>().with_context(|| format!("Invalid HOLIDAY_PREFETCH_FROM: {}", v)))
            .transpose()?;

        Ok(Self {
            cache_dir,
            source,
            schedule: ScheduleConfig {
                hour,
                minute,
                utc_offset,
                prefetch_from_year,
            },
            bind_addr: var("HOLIDAY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            log_dir: var("HOLIDAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.parse().with_context(|| format!("Invalid {}: {}", key, v)),
        None => Ok(default),
    }
}

/// Parse `+08:00`, `-05:30`, `+0800`, `Z` or `UTC` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("Invalid UTC offset");
    }

    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => bail!("UTC offset must start with '+' or '-': {}", raw),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("UTC offset must look like +HH:MM: {}", raw);
    }

    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    if hours > 14 || minutes > 59 {
        bail!("UTC offset out of range: {}", raw);
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset out of range: {}", raw))
}
