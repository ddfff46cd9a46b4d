use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{LocationKey, ModelError, WeatherRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create store directory '{0}'")]
    CreateDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to read store file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to append record to store file '{0}'")]
    Append(PathBuf, #[source] std::io::Error),

    #[error("Failed to truncate store file '{0}'")]
    Truncate(PathBuf, #[source] std::io::Error),

    #[error("Rejected invalid record")]
    InvalidRecord(#[from] ModelError),
}

/// Classification of a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Appended to durable storage.
    Accepted,
    /// Inside the rolling dedup window of the latest record for the same
    /// location; not an error, just nothing new to write.
    Duplicate,
}

/// What `Store::open` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Records recovered from the valid prefix of the file.
    pub loaded: usize,
    /// Trailing entries discarded because they could not be parsed.
    pub discarded: usize,
}

/// Append-only record log with duplicate suppression.
///
/// Persists as JSON Lines, one record per line. A record is appended with a
/// single write so a crash leaves at most one torn trailing line, which the
/// next open discards as part of prefix recovery. All mutation goes through
/// `&mut self`, so concurrent fetch results must be submitted from one
/// writer at a time.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    window: Duration,
    records: Vec<WeatherRecord>,
    latest: HashMap<LocationKey, DateTime<Utc>>,
}

impl Store {
    /// Open (or create) the store file, recovering the largest valid prefix.
    ///
    /// Corruption is never fatal: the first unparsable line ends the prefix
    /// and everything from there on is counted in `LoadReport::discarded`.
    pub fn open(path: PathBuf, window: Duration) -> Result<(Self, LoadReport), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::CreateDir(parent.to_path_buf(), e))?;
        }

        let mut records = Vec::new();
        let mut discarded = 0;

        if path.exists() {
            let contents =
                fs::read_to_string(&path).map_err(|e| StoreError::Read(path.clone(), e))?;

            let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
            for line in lines.by_ref() {
                match serde_json::from_str::<WeatherRecord>(line) {
                    Ok(record) if record.validate().is_ok() => records.push(record),
                    _ => {
                        discarded = 1 + lines.count();
                        break;
                    }
                }
            }

            if discarded > 0 {
                warn!(
                    path = %path.display(),
                    loaded = records.len(),
                    discarded,
                    "store file corrupted, recovered valid prefix"
                );
            }
        }

        let mut latest: HashMap<LocationKey, DateTime<Utc>> = HashMap::new();
        for record in &records {
            let entry = latest.entry(record.key()).or_insert(record.observed_at_utc);
            if record.observed_at_utc > *entry {
                *entry = record.observed_at_utc;
            }
        }

        let report = LoadReport { loaded: records.len(), discarded };
        debug!(path = %path.display(), loaded = report.loaded, "opened store");

        Ok((Self { path, window, records, latest }, report))
    }

    /// Validate and classify a record, appending it when accepted.
    pub fn submit(&mut self, record: WeatherRecord) -> Result<Submission, StoreError> {
        record.validate()?;

        let key = record.key();
        if let Some(last) = self.latest.get(&key) {
            let gap = record.observed_at_utc.signed_duration_since(*last);
            if gap.abs() < self.window {
                debug!(location = %key, gap_minutes = gap.num_minutes(), "duplicate inside window");
                return Ok(Submission::Duplicate);
            }
        }

        self.append(&record)?;
        self.latest.insert(key, record.observed_at_utc);
        self.records.push(record);
        Ok(Submission::Accepted)
    }

    /// True when the latest record for `key` is still inside the dedup
    /// window relative to `now`. Used to skip a fetch entirely.
    pub fn has_fresh_record(&self, key: &LocationKey, now: DateTime<Utc>) -> bool {
        self.latest
            .get(key)
            .is_some_and(|last| now.signed_duration_since(*last).abs() < self.window)
    }

    /// Every stored record, in append order.
    pub fn all_records(&self) -> &[WeatherRecord] {
        &self.records
    }

    /// Records for one location, optionally restricted to
    /// `observed_at_utc >= since`, in append order.
    pub fn records_for(
        &self,
        key: &LocationKey,
        since: Option<DateTime<Utc>>,
    ) -> Vec<&WeatherRecord> {
        self.records
            .iter()
            .filter(|r| r.key() == *key)
            .filter(|r| since.is_none_or(|s| r.observed_at_utc >= s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Administrative full reset: truncates the file and clears all state.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        fs::write(&self.path, b"").map_err(|e| StoreError::Truncate(self.path.clone(), e))?;
        self.records.clear();
        self.latest.clear();
        Ok(())
    }

    fn append(&self, record: &WeatherRecord) -> Result<(), StoreError> {
        // serde_json never fails on this struct; treat it as I/O if it does.
        let mut line = serde_json::to_string(record)
            .map_err(|e| StoreError::Append(self.path.clone(), e.into()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Append(self.path.clone(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::Append(self.path.clone(), e))?;
        file.flush().map_err(|e| StoreError::Append(self.path.clone(), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn record_at(location: &str, temperature_c: f64, utc: DateTime<Utc>) -> WeatherRecord {
        WeatherRecord {
            location: location.to_string(),
            temperature_c,
            condition: "clear sky".to_string(),
            humidity_pct: 50,
            observed_at_utc: utc,
            observed_at_local: utc.with_timezone(&Local),
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    fn open_store(path: PathBuf) -> (Store, LoadReport) {
        Store::open(path, Duration::hours(2)).expect("open store")
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempdir().expect("tempdir");
        let (store, report) = open_store(dir.path().join("log.jsonl"));

        assert!(store.is_empty());
        assert_eq!(report, LoadReport { loaded: 0, discarded: 0 });
    }

    #[test]
    fn accepts_then_rejects_inside_window() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let t = base_time();

        assert_eq!(
            store.submit(record_at("Delhi", 30.0, t)).expect("submit"),
            Submission::Accepted
        );
        // 1h59m later: still inside the 2h window.
        assert_eq!(
            store
                .submit(record_at("Delhi", 31.0, t + Duration::minutes(119)))
                .expect("submit"),
            Submission::Duplicate
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn accepts_past_the_window_boundary() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let t = base_time();

        store.submit(record_at("Delhi", 30.0, t)).expect("submit");
        // 2h01m later: outside the window.
        assert_eq!(
            store
                .submit(record_at("Delhi", 31.0, t + Duration::minutes(121)))
                .expect("submit"),
            Submission::Accepted
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn window_is_relative_to_the_latest_record_only() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let t = base_time();

        store.submit(record_at("Delhi", 30.0, t)).expect("submit");
        store
            .submit(record_at("Delhi", 31.0, t + Duration::hours(3)))
            .expect("submit");

        // Within 2h of the first record but 1h after the latest one.
        assert_eq!(
            store
                .submit(record_at("Delhi", 32.0, t + Duration::hours(4)))
                .expect("submit"),
            Submission::Duplicate
        );
    }

    #[test]
    fn dedup_ignores_location_casing() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let t = base_time();

        store.submit(record_at("Delhi", 30.0, t)).expect("submit");
        assert_eq!(
            store
                .submit(record_at("  DELHI ", 30.5, t + Duration::minutes(30)))
                .expect("submit"),
            Submission::Duplicate
        );
    }

    #[test]
    fn different_locations_do_not_dedup_each_other() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let t = base_time();

        store.submit(record_at("Delhi", 30.0, t)).expect("submit");
        assert_eq!(
            store
                .submit(record_at("Mumbai", 29.0, t + Duration::minutes(1)))
                .expect("submit"),
            Submission::Accepted
        );
    }

    #[test]
    fn resubmitting_an_identical_record_is_a_duplicate() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let record = record_at("Delhi", 30.0, base_time());

        assert_eq!(store.submit(record.clone()).expect("submit"), Submission::Accepted);
        assert_eq!(store.submit(record).expect("submit"), Submission::Duplicate);
    }

    #[test]
    fn rejects_invalid_records() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));

        let err = store.submit(record_at("   ", 30.0, base_time())).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(ModelError::EmptyLocation)));
        assert!(store.is_empty());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        let t = base_time();

        {
            let (mut store, _) = open_store(path.clone());
            store.submit(record_at("Delhi", 30.0, t)).expect("submit");
            store.submit(record_at("Oslo", 4.0, t)).expect("submit");
        }

        let (store, report) = open_store(path);
        assert_eq!(report, LoadReport { loaded: 2, discarded: 0 });
        assert_eq!(store.all_records().len(), 2);
        assert_eq!(store.all_records()[0].location, "Delhi");

        // The dedup index must be rebuilt from disk too.
        assert!(store.has_fresh_record(&LocationKey::new("delhi"), t + Duration::minutes(30)));
    }

    #[test]
    fn torn_trailing_line_is_discarded_on_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        let t = base_time();

        {
            let (mut store, _) = open_store(path.clone());
            store.submit(record_at("Delhi", 30.0, t)).expect("submit");
            store.submit(record_at("Oslo", 4.0, t)).expect("submit");
        }

        // Simulate a crash mid-append.
        let mut contents = fs::read_to_string(&path).expect("read");
        contents.push_str("{\"location\":\"Lima\",\"temperature_c\":18");
        fs::write(&path, contents).expect("write");

        let (store, report) = open_store(path);
        assert_eq!(report, LoadReport { loaded: 2, discarded: 1 });
        assert_eq!(store.all_records().len(), 2);
    }

    #[test]
    fn corruption_mid_file_truncates_to_valid_prefix() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        let t = base_time();

        {
            let (mut store, _) = open_store(path.clone());
            store.submit(record_at("Delhi", 30.0, t)).expect("submit");
        }

        let mut contents = fs::read_to_string(&path).expect("read");
        contents.push_str("garbage line\n");
        contents.push_str(
            &(serde_json::to_string(&record_at("Oslo", 4.0, t)).expect("serialize") + "\n"),
        );
        fs::write(&path, contents).expect("write");

        // Everything after the first bad line goes, including the valid
        // record behind it.
        let (store, report) = open_store(path);
        assert_eq!(report, LoadReport { loaded: 1, discarded: 2 });
        assert_eq!(store.all_records().len(), 1);
    }

    #[test]
    fn records_for_filters_by_key_and_since() {
        let dir = tempdir().expect("tempdir");
        let (mut store, _) = open_store(dir.path().join("log.jsonl"));
        let t = base_time();

        store.submit(record_at("Delhi", 30.0, t)).expect("submit");
        store
            .submit(record_at("Delhi", 32.0, t + Duration::hours(3)))
            .expect("submit");
        store.submit(record_at("Oslo", 4.0, t)).expect("submit");

        let key = LocationKey::new("Delhi");
        assert_eq!(store.records_for(&key, None).len(), 2);

        let recent = store.records_for(&key, Some(t + Duration::hours(1)));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].temperature_c, 32.0);
    }

    #[test]
    fn reset_clears_disk_and_memory() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");

        let (mut store, _) = open_store(path.clone());
        store.submit(record_at("Delhi", 30.0, base_time())).expect("submit");
        store.reset().expect("reset");

        assert!(store.is_empty());
        let (reopened, report) = open_store(path);
        assert!(reopened.is_empty());
        assert_eq!(report, LoadReport { loaded: 0, discarded: 0 });
    }
}
