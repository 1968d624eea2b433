use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::HolidayRecord;

/// One year of explicit holiday entries plus fetch metadata.
///
/// A dataset is immutable once built; a refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearDataset {
    pub year: i32,
    pub fetched_at: DateTime<Utc>,
    /// ETag (or other version marker) reported by the source, if any.
    #[serde(default)]
    pub source_version: Option<String>,
    #[serde(default)]
    pub records: BTreeMap<NaiveDate, HolidayRecord>,
}

impl YearDataset {
    pub fn new(
        year: i32,
        records: impl IntoIterator<Item = HolidayRecord>,
        source_version: Option<String>,
    ) -> Self {
        Self {
            year,
            fetched_at: Utc::now(),
            source_version,
            records: records.into_iter().map(|r| (r.date, r)).collect(),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&HolidayRecord> {
        self.records.get(&date)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew (negative ages)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
