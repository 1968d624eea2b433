use std::collections::BTreeMap;

use serde::Deserialize;

use super::HolidayType;

/// A yearly document as published by the remote repository.
///
/// Two layouts are accepted. Unknown fields are ignored in both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UpstreamDocument {
    /// `{"year": 2025, "papers": [...], "days": [{"name", "date", "isOffDay"}]}`
    HolidayCn(HolidayCnDocument),
    /// `{"2025-10-01": {"name": "...", "type": "statutory"}}`
    Mapping(BTreeMap<String, UpstreamEntry>),
}

#[derive(Debug, Deserialize)]
pub struct HolidayCnDocument {
    #[serde(default)]
    pub year: Option<i32>,
    pub days: Vec<HolidayCnDay>,
}

#[derive(Debug, Deserialize)]
pub struct HolidayCnDay {
    #[serde(default)]
    pub name: String,
    pub date: String,
    #[serde(rename = "isOffDay", default)]
    pub is_off_day: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamEntry {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HolidayType,
}
