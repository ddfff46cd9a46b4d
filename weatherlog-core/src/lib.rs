//! Core library for the `weatherlog` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The concurrent remote fetcher and its per-location outcomes
//! - The deduplicating, append-only record store
//! - Pure aggregate statistics over stored records
//!
//! It is used by `weatherlog-cli`, but can also be reused by other binaries
//! or services; callers interact only with `fetch_many`/`fetch_and_store`,
//! `Store::submit`/`all_records`, and the aggregate functions.

pub mod aggregate;
pub mod config;
pub mod fetcher;
pub mod model;
pub mod provider;
pub mod store;

pub use aggregate::{AggregateError, Extremes, LocationAverage};
pub use config::Config;
pub use fetcher::{BatchItem, BatchSummary, FetchOutcome, fetch_and_store, fetch_many};
pub use model::{LocationKey, WeatherRecord};
pub use provider::{WeatherProvider, provider_from_config};
pub use store::{LoadReport, Store, StoreError, Submission};
