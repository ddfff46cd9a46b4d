use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::model::{LocationKey, WeatherRecord};
use crate::provider::WeatherProvider;
use crate::store::{Store, StoreError, Submission};

/// Result of attempting to retrieve weather for a single location.
///
/// Failures are per-location outcomes, never batch-aborting faults. Detail
/// strings carry a truncated snippet of what the remote service returned.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(WeatherRecord),
    /// The remote service does not know the location.
    NotFound,
    /// The credential was rejected.
    AuthError,
    /// Network failure, timeout, or a 5xx from the remote service.
    TransientError(String),
    /// A 2xx response whose payload could not be decoded.
    MalformedResponse(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// Short human-readable description, for per-location summaries.
    pub fn describe(&self) -> String {
        match self {
            FetchOutcome::Success(record) => {
                format!("{:.1}°C, {}", record.temperature_c, record.condition)
            }
            FetchOutcome::NotFound => "location not found".to_string(),
            FetchOutcome::AuthError => "API key rejected".to_string(),
            FetchOutcome::TransientError(detail) => format!("transient error: {detail}"),
            FetchOutcome::MalformedResponse(detail) => format!("malformed response: {detail}"),
        }
    }
}

/// Fetch current weather for every distinct location concurrently.
///
/// Returns exactly one outcome per distinct [`LocationKey`] in the input;
/// duplicate names collapse onto the first spelling seen. Outcomes complete
/// in arbitrary order and are correlated by key, not input position.
pub async fn fetch_many(
    provider: Arc<dyn WeatherProvider>,
    locations: &[String],
) -> HashMap<LocationKey, FetchOutcome> {
    let mut requested: Vec<(LocationKey, String)> = Vec::new();
    for name in locations {
        let key = LocationKey::new(name);
        if key.is_empty() || requested.iter().any(|(k, _)| *k == key) {
            continue;
        }
        requested.push((key, name.trim().to_string()));
    }

    let mut set = JoinSet::new();
    for (key, name) in &requested {
        let provider = Arc::clone(&provider);
        let key = key.clone();
        let name = name.clone();
        set.spawn(async move {
            debug!(location = %key, "requesting current weather");
            let outcome = provider.current(&name).await;
            (key, outcome)
        });
    }

    let mut outcomes = HashMap::with_capacity(requested.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((key, outcome)) => {
                outcomes.insert(key, outcome);
            }
            Err(err) => {
                warn!(error = %err, "fetch task did not complete");
            }
        }
    }

    // A task that panicked or was cancelled still owes its key an outcome.
    for (key, _) in requested {
        outcomes
            .entry(key)
            .or_insert_with(|| FetchOutcome::TransientError("fetch task aborted".to_string()));
    }

    outcomes
}

/// What happened to one requested location during a batch.
#[derive(Debug, Clone)]
pub enum BatchItem {
    /// Fetched and appended to the store.
    Logged(WeatherRecord),
    /// Not fetched: the store already holds a record inside the dedup window.
    SkippedFresh,
    /// Fetched, but the store classified it as a duplicate.
    Duplicate,
    /// The fetch failed; carries the non-success [`FetchOutcome`].
    Failed(FetchOutcome),
}

/// Per-location results of one fetch-and-store batch, keyed for
/// deterministic iteration.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub items: BTreeMap<LocationKey, BatchItem>,
}

impl BatchSummary {
    pub fn logged_count(&self) -> usize {
        self.items.values().filter(|i| matches!(i, BatchItem::Logged(_))).count()
    }

    pub fn failed_count(&self) -> usize {
        self.items.values().filter(|i| matches!(i, BatchItem::Failed(_))).count()
    }
}

/// Fetch the given locations concurrently and submit successes to the store.
///
/// Unless `force` is set, locations whose latest stored record is still
/// inside the dedup window are skipped without issuing a request, matching
/// the store's own duplicate rule. Submissions happen sequentially on the
/// calling task, so the store's single-writer discipline holds even though
/// the fetches ran concurrently.
pub async fn fetch_and_store(
    provider: Arc<dyn WeatherProvider>,
    store: &mut Store,
    locations: &[String],
    force: bool,
) -> Result<BatchSummary, StoreError> {
    let now = Utc::now();
    let mut summary = BatchSummary::default();
    let mut to_fetch: Vec<String> = Vec::new();

    for name in locations {
        let key = LocationKey::new(name);
        if key.is_empty() || summary.items.contains_key(&key) {
            continue;
        }
        if !force && store.has_fresh_record(&key, now) {
            info!(location = %key, "skipping, recent record inside dedup window");
            summary.items.insert(key, BatchItem::SkippedFresh);
        } else {
            to_fetch.push(name.clone());
        }
    }

    let outcomes = fetch_many(provider, &to_fetch).await;

    for (key, outcome) in outcomes {
        let item = match outcome {
            FetchOutcome::Success(record) => match store.submit(record.clone())? {
                Submission::Accepted => {
                    info!(location = %key, temperature_c = record.temperature_c, "logged record");
                    BatchItem::Logged(record)
                }
                Submission::Duplicate => {
                    info!(location = %key, "store rejected record as duplicate");
                    BatchItem::Duplicate
                }
            },
            failure => {
                warn!(location = %key, outcome = %failure.describe(), "fetch failed");
                BatchItem::Failed(failure)
            }
        };
        summary.items.insert(key, item);
    }

    Ok(summary)
}
