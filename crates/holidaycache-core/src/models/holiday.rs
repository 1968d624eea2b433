use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Display name used for unlisted Saturdays and Sundays.
pub const WEEKEND_NAME: &str = "周末";

/// Display name used for unlisted weekdays.
pub const WORKDAY_NAME: &str = "工作日";

/// Classification of a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HolidayType {
    /// Non-working day designated by official decree.
    #[serde(alias = "holiday")]
    Statutory,
    /// Normally non-working day redesignated as a working day.
    #[serde(alias = "adjusted_workday", alias = "workday")]
    AdjustedWorkday,
    Weekend,
    None,
    /// Only produced by a degraded resolution, never stored in a dataset.
    Unknown,
}

impl HolidayType {
    /// Whether a day of this type is a non-working day.
    pub fn is_off_day(&self) -> bool {
        matches!(self, HolidayType::Statutory | HolidayType::Weekend)
    }
}

impl std::fmt::Display for HolidayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HolidayType::Statutory => write!(f, "statutory"),
            HolidayType::AdjustedWorkday => write!(f, "adjusted-workday"),
            HolidayType::Weekend => write!(f, "weekend"),
            HolidayType::None => write!(f, "none"),
            HolidayType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayRecord {
    pub date: NaiveDate,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HolidayType,
    pub is_holiday: bool,
}

impl HolidayRecord {
    pub fn new(date: NaiveDate, name: impl Into<String>, kind: HolidayType) -> Self {
        Self {
            date,
            name: name.into(),
            kind,
            is_holiday: kind.is_off_day(),
        }
    }

    /// Default calendar rule for a day with no explicit entry:
    /// Saturday and Sunday are weekend days off, everything else is a workday.
    pub fn default_for(date: NaiveDate) -> Self {
        if is_weekend(date) {
            Self::new(date, WEEKEND_NAME, HolidayType::Weekend)
        } else {
            Self::new(date, WORKDAY_NAME, HolidayType::None)
        }
    }

    /// Best-effort record when the year's data could not be obtained.
    /// `is_holiday` still follows the weekday/weekend rule.
    pub fn unknown(date: NaiveDate) -> Self {
        let fallback = Self::default_for(date);
        Self {
            kind: HolidayType::Unknown,
            ..fallback
        }
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Chinese short weekday name ("周一" .. "周日").
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "周一",
        Weekday::Tue => "周二",
        Weekday::Wed => "周三",
        Weekday::Thu => "周四",
        Weekday::Fri => "周五",
        Weekday::Sat => "周六",
        Weekday::Sun => "周日",
    }
}
