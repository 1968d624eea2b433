use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::models::YearDataset;

/// Years currently resident in memory.
pub type CacheIndex = BTreeSet<i32>;

/// Owns the per-year datasets, on disk and in memory.
///
/// Reads come from memory only. Every mutation goes through [`CacheManager::put`],
/// which writes a temp file, renames it over `<dir>/<year>.json`, and only then
/// swaps the in-memory entry. Writers are serialized; readers never wait on I/O.
pub struct CacheManager {
    cache_dir: PathBuf,
    datasets: RwLock<HashMap<i32, Arc<YearDataset>>>,
    write_lock: Mutex<()>,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
        Ok(Self {
            cache_dir,
            datasets: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, year: i32) -> PathBuf {
        self.cache_dir.join(format!("{}.json", year))
    }

    fn temp_path(&self, year: i32) -> PathBuf {
        self.cache_dir.join(format!(".{}.json.tmp", year))
    }

    /// Year encoded in a cache file name, if it is one (`YYYY.json`).
    fn year_from_file_name(name: &str) -> Option<i32> {
        let stem = name.strip_suffix(".json")?;
        if stem.len() != 4 || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    fn load_file(path: &Path, year: i32) -> Result<YearDataset> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;

        let dataset: YearDataset = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;

        if dataset.year != year {
            bail!(
                "Cache file {} holds data for {}",
                path.display(),
                dataset.year
            );
        }
        Ok(dataset)
    }

    /// Scan the cache directory and load every year file into memory.
    ///
    /// A file that cannot be read or parsed is logged and skipped; only a
    /// failure to list the directory itself is an error.
    pub fn load(&self) -> Result<CacheIndex> {
        let entries = std::fs::read_dir(&self.cache_dir)
            .with_context(|| format!("Failed to list cache directory: {}", self.cache_dir.display()))?;

        let mut loaded = HashMap::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read cache directory entry");
                    continue;
                }
            };
            let name = entry.file_name();
            let Some(year) = name.to_str().and_then(Self::year_from_file_name) else {
                continue;
            };

            match Self::load_file(&entry.path(), year) {
                Ok(dataset) => {
                    debug!(year, entries = dataset.len(), "Loaded cached dataset");
                    loaded.insert(year, Arc::new(dataset));
                }
                Err(e) => {
                    warn!(year, error = %format!("{:#}", e), "Skipping unreadable cache file");
                }
            }
        }

        let index: CacheIndex = loaded.keys().copied().collect();
        {
            let mut datasets = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
            datasets.extend(loaded);
        }
        info!(years = ?index, "Cache loaded");
        Ok(index)
    }

    /// Persist `dataset` as the data for `year` and make it visible to readers.
    pub fn put(&self, year: i32, dataset: YearDataset) -> Result<()> {
        if dataset.year != year {
            bail!("Refusing to store {} data as {}", dataset.year, year);
        }

        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let contents = serde_json::to_string_pretty(&dataset)?;
        let tmp = self.temp_path(year);
        let path = self.cache_path(year);

        let write_result = (|| -> Result<()> {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp, &path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        let entries = dataset.len();
        self.datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(year, Arc::new(dataset));
        debug!(year, entries, "Cached dataset stored");
        Ok(())
    }

    pub fn get(&self, year: i32) -> Option<Arc<YearDataset>> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&year)
            .cloned()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&year)
    }

    pub fn years(&self) -> CacheIndex {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Human-readable fetch age of every resident year.
    pub fn cache_ages(&self) -> BTreeMap<i32, String> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(year, dataset)| (*year, dataset.age_display()))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{HolidayRecord, HolidayType};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fresh, empty directory under the system temp dir.
    pub(crate) fn scratch_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "holidaycache-{}-{}-{}",
            label,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn dataset_2025() -> YearDataset {
        YearDataset::new(
            2025,
            vec![HolidayRecord::new(
                NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
                "国庆节",
                HolidayType::Statutory,
            )],
            None,
        )
    }

    #[test]
    fn test_put_then_get() {
        let cache = CacheManager::new(scratch_dir("put-get")).unwrap();
        assert!(cache.get(2025).is_none());

        cache.put(2025, dataset_2025()).unwrap();
        let stored = cache.get(2025).unwrap();
        assert_eq!(*stored, dataset_2025_with(stored.fetched_at));
        assert!(cache.cache_dir().join("2025.json").exists());
        assert!(!cache.cache_dir().join(".2025.json.tmp").exists());
        assert_eq!(cache.years(), CacheIndex::from([2025]));
    }

    fn dataset_2025_with(fetched_at: chrono::DateTime<chrono::Utc>) -> YearDataset {
        YearDataset {
            fetched_at,
            ..dataset_2025()
        }
    }

    #[test]
    fn test_put_is_idempotent() {
        let cache = CacheManager::new(scratch_dir("idempotent")).unwrap();
        let dataset = dataset_2025();

        cache.put(2025, dataset.clone()).unwrap();
        let first_bytes = std::fs::read(cache.cache_dir().join("2025.json")).unwrap();
        let first_mem = cache.get(2025).unwrap();

        cache.put(2025, dataset).unwrap();
        let second_bytes = std::fs::read(cache.cache_dir().join("2025.json")).unwrap();
        let second_mem = cache.get(2025).unwrap();

        assert_eq!(first_bytes, second_bytes);
        assert_eq!(*first_mem, *second_mem);
        assert_eq!(cache.years().len(), 1);
    }

    #[test]
    fn test_put_rejects_mismatched_year() {
        let cache = CacheManager::new(scratch_dir("mismatch")).unwrap();
        assert!(cache.put(2026, dataset_2025()).is_err());
        assert!(cache.get(2026).is_none());
        assert!(!cache.cache_dir().join("2026.json").exists());
    }

    #[test]
    fn test_load_round_trips_through_disk() {
        let dir = scratch_dir("reload");
        let writer = CacheManager::new(dir.clone()).unwrap();
        writer.put(2025, dataset_2025()).unwrap();

        let reader = CacheManager::new(dir).unwrap();
        let index = reader.load().unwrap();
        assert_eq!(index, CacheIndex::from([2025]));
        assert_eq!(reader.get(2025), writer.get(2025));
    }

    #[test]
    fn test_load_skips_corrupt_and_foreign_files() {
        let dir = scratch_dir("corrupt");
        let writer = CacheManager::new(dir.clone()).unwrap();
        writer.put(2025, dataset_2025()).unwrap();

        std::fs::write(dir.join("2024.json"), "{ not json").unwrap();
        // Valid dataset stored under the wrong year's name
        std::fs::copy(dir.join("2025.json"), dir.join("2023.json")).unwrap();
        std::fs::write(dir.join("._2025.json"), "junk").unwrap();
        std::fs::write(dir.join(".2026.json.tmp"), "partial").unwrap();
        std::fs::write(dir.join("notes.txt"), "hello").unwrap();

        let reader = CacheManager::new(dir).unwrap();
        let index = reader.load().unwrap();
        assert_eq!(index, CacheIndex::from([2025]));
        assert!(reader.get(2024).is_none());
        assert!(reader.get(2023).is_none());
    }

    #[test]
    fn test_year_from_file_name() {
        assert_eq!(CacheManager::year_from_file_name("2025.json"), Some(2025));
        assert_eq!(CacheManager::year_from_file_name("._2025.json"), None);
        assert_eq!(CacheManager::year_from_file_name(".2025.json.tmp"), None);
        assert_eq!(CacheManager::year_from_file_name("25.json"), None);
        assert_eq!(CacheManager::year_from_file_name("2025.txt"), None);
    }

    #[test]
    fn test_cache_ages() {
        let cache = CacheManager::new(scratch_dir("ages")).unwrap();
        cache.put(2025, dataset_2025()).unwrap();
        let ages = cache.cache_ages();
        assert_eq!(ages.get(&2025).map(String::as_str), Some("just now"));
    }
}
