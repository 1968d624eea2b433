//! Local caching of yearly holiday datasets.
//!
//! This module provides the `CacheManager`, which keeps one JSON file per
//! year (`<dir>/<YYYY>.json`) and an in-memory copy of every loaded year.
//! Writes replace a year's file atomically (temp file + rename), so a crash
//! mid-write never leaves a half-written dataset behind.

pub mod manager;

pub use manager::{CacheIndex, CacheManager};
