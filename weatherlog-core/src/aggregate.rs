//! Read-only statistics over a snapshot of stored records.
//!
//! Everything here is a pure function of the record slice it is handed:
//! no I/O, no hidden state, deterministic for a given input.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{LocationKey, WeatherRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("No records for the requested scope")]
    Empty,
}

/// Hottest and coldest among the most recent record per location.
#[derive(Debug, Clone, PartialEq)]
pub struct Extremes {
    pub hottest: (LocationKey, f64),
    pub coldest: (LocationKey, f64),
}

/// Mean temperature with sample count for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationAverage {
    pub key: LocationKey,
    pub display_name: String,
    pub average_c: f64,
    pub samples: usize,
}

/// Arithmetic mean of every recorded temperature for `key`.
pub fn average_temperature(
    records: &[WeatherRecord],
    key: &LocationKey,
) -> Result<f64, AggregateError> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for record in records.iter().filter(|r| r.key() == *key) {
        sum += record.temperature_c;
        count += 1;
    }
    if count == 0 {
        return Err(AggregateError::Empty);
    }
    Ok(sum / count as f64)
}

/// Per-location averages, sorted ascending by mean temperature.
///
/// The display name of a location is taken from its most recent record.
pub fn location_averages(records: &[WeatherRecord]) -> Vec<LocationAverage> {
    let mut grouped: HashMap<LocationKey, (String, f64, usize)> = HashMap::new();
    for record in records {
        let entry = grouped
            .entry(record.key())
            .or_insert_with(|| (record.location.trim().to_string(), 0.0, 0));
        entry.0 = record.location.trim().to_string();
        entry.1 += record.temperature_c;
        entry.2 += 1;
    }

    let mut averages: Vec<LocationAverage> = grouped
        .into_iter()
        .map(|(key, (display_name, sum, samples))| LocationAverage {
            key,
            display_name,
            average_c: sum / samples as f64,
            samples,
        })
        .collect();

    averages.sort_by(|a, b| {
        a.average_c
            .partial_cmp(&b.average_c)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    averages
}

/// Temperature extremes over the most recent record per location.
///
/// When `since` is given, records older than it are dropped before the
/// latest-per-location reduction. Ties on temperature resolve to the
/// lexicographically smallest key.
pub fn extremes(
    records: &[WeatherRecord],
    since: Option<DateTime<Utc>>,
) -> Result<Extremes, AggregateError> {
    let mut latest: HashMap<LocationKey, &WeatherRecord> = HashMap::new();
    for record in records {
        if since.is_some_and(|s| record.observed_at_utc < s) {
            continue;
        }
        let key = record.key();
        match latest.get(&key) {
            Some(existing) if existing.observed_at_utc > record.observed_at_utc => {}
            _ => {
                latest.insert(key, record);
            }
        }
    }

    let mut hottest: Option<(LocationKey, f64)> = None;
    let mut coldest: Option<(LocationKey, f64)> = None;

    for (key, record) in latest {
        let candidate = (key, record.temperature_c);
        hottest = Some(match hottest {
            Some(best) if !beats(&candidate, &best, true) => best,
            _ => candidate.clone(),
        });
        coldest = Some(match coldest {
            Some(best) if !beats(&candidate, &best, false) => best,
            _ => candidate,
        });
    }

    match (hottest, coldest) {
        (Some(hottest), Some(coldest)) => Ok(Extremes { hottest, coldest }),
        _ => Err(AggregateError::Empty),
    }
}

fn beats(candidate: &(LocationKey, f64), best: &(LocationKey, f64), want_hotter: bool) -> bool {
    if candidate.1 == best.1 {
        return candidate.0 < best.0;
    }
    if want_hotter { candidate.1 > best.1 } else { candidate.1 < best.1 }
}
