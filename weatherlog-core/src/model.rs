use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for a [`WeatherRecord`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Record location is empty")]
    EmptyLocation,

    #[error("Humidity {0}% is outside the 0-100 range")]
    HumidityOutOfRange(u8),
}

/// Normalized identity of a named place: trimmed and case-folded.
///
/// Two records whose locations differ only in casing or surrounding
/// whitespace share the same key. Ordering is lexicographic over the folded
/// form, which makes aggregate tie-breaks deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One weather observation, as persisted to the store.
///
/// `observed_at_utc` is stamped by the fetcher at parse time and is the
/// authoritative ordering and dedup key. `observed_at_local` exists for
/// display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub location: String,
    pub temperature_c: f64,
    pub condition: String,
    pub humidity_pct: u8,
    pub observed_at_utc: DateTime<Utc>,
    pub observed_at_local: DateTime<Local>,
}

impl WeatherRecord {
    /// Key used for grouping and dedup.
    pub fn key(&self) -> LocationKey {
        LocationKey::new(&self.location)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.location.trim().is_empty() {
            return Err(ModelError::EmptyLocation);
        }
        if self.humidity_pct > 100 {
            return Err(ModelError::HumidityOutOfRange(self.humidity_pct));
        }
        Ok(())
    }
}
