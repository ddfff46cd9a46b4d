use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use weatherlog_core::{
    AggregateError, BatchItem, BatchSummary, Config, LocationKey, Store, WeatherProvider,
    aggregate, fetch_and_store, provider_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherlog", version, about = "Weather logger & analyzer CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeatherMap API key in the config file.
    Configure,

    /// Fetch current weather for cities and append new records to the log.
    Fetch {
        /// City names, e.g. "Delhi" "New York".
        #[arg(required = true)]
        cities: Vec<String>,

        /// Fetch even when a recent record exists; the store still
        /// suppresses duplicates.
        #[arg(long)]
        force: bool,
    },

    /// Show the most recent log entries as a table.
    Logs {
        /// Restrict to one city.
        #[arg(long)]
        city: Option<String>,

        /// How many entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Per-city average temperatures, coldest first.
    Averages,

    /// Hottest and coldest cities, overall and within a recent window.
    Extremes {
        /// Width of the recency window in hours.
        #[arg(long, default_value_t = 24)]
        since_hours: i64,
    },

    /// Plain-text temperature trend for one city.
    Trend {
        /// City name.
        city: String,
    },

    /// Fetch the given cities on a fixed interval until Ctrl-C.
    Watch {
        /// City names.
        #[arg(required = true)]
        cities: Vec<String>,

        /// Minutes between fetches; must be at least 1.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        interval_mins: u64,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Fetch { cities, force } => fetch(cities, force).await,
            Command::Logs { city, limit } => logs(city, limit),
            Command::Averages => averages(),
            Command::Extremes { since_hours } => extremes(since_hours),
            Command::Trend { city } => trend(&city),
            Command::Watch { cities, interval_mins } => watch(cities, interval_mins).await,
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Text::new("OpenWeatherMap API key:")
        .prompt()
        .context("Failed to read API key from prompt")?;

    config.set_api_key(api_key.trim().to_string());
    config.save()?;

    println!("Saved config to {}", Config::config_file_path()?.display());
    Ok(())
}

/// Open the store from config, surfacing any recovery loss to the user.
fn open_store(config: &Config) -> Result<Store> {
    let path = config.data_file_path()?;
    let (store, report) = Store::open(path, config.dedup_window())
        .context("Failed to open the weather record store")?;

    if report.discarded > 0 {
        eprintln!(
            "Warning: store file was corrupted; recovered {} records, \
             discarded {} trailing entries.",
            report.loaded, report.discarded
        );
    }

    Ok(store)
}

async fn fetch(cities: Vec<String>, force: bool) -> Result<()> {
    let config = Config::load()?;
    let provider = Arc::new(provider_from_config(&config)?) as Arc<dyn WeatherProvider>;
    let mut store = open_store(&config)?;

    println!("Fetching weather for: {}", cities.join(", "));
    let summary = fetch_and_store(provider, &mut store, &cities, force).await?;
    print_batch(&summary);

    println!("\nTotal entries in the log: {}", store.len());
    Ok(())
}

fn print_batch(summary: &BatchSummary) {
    for (key, item) in &summary.items {
        match item {
            BatchItem::Logged(record) => {
                println!(
                    "  {}: logged {:.1}°C, {}, {}% humidity",
                    record.location, record.temperature_c, record.condition, record.humidity_pct
                );
            }
            BatchItem::SkippedFresh => {
                println!("  {key}: skipped, recent record already logged");
            }
            BatchItem::Duplicate => {
                println!("  {key}: duplicate within the dedup window, not logged");
            }
            BatchItem::Failed(outcome) => {
                println!("  {key}: failed, {}", outcome.describe());
            }
        }
    }
}

fn logs(city: Option<String>, limit: usize) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;

    let key = city.as_deref().map(LocationKey::new);
    let records: Vec<_> = match &key {
        Some(key) => store.records_for(key, None),
        None => store.all_records().iter().collect(),
    };

    if records.is_empty() {
        println!("No weather data available.");
        return Ok(());
    }

    println!(
        "{:<18} {:>12} {:<22} {:>9} {:<17}",
        "City", "Temperature", "Condition", "Humidity", "Local Time"
    );
    for record in records.iter().rev().take(limit).rev() {
        println!(
            "{:<18} {:>11.1}° {:<22} {:>8}% {:<17}",
            record.location,
            record.temperature_c,
            record.condition,
            record.humidity_pct,
            record.observed_at_local.format("%Y-%m-%d %H:%M"),
        );
    }
    println!("\nTotal entries: {}", store.len());
    Ok(())
}

fn averages() -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;

    let averages = aggregate::location_averages(store.all_records());
    if averages.is_empty() {
        println!("No weather data available.");
        return Ok(());
    }

    println!("{:<18} {:>18} {:>12}", "City", "Average (°C)", "Samples");
    for avg in averages {
        println!("{:<18} {:>18.1} {:>12}", avg.display_name, avg.average_c, avg.samples);
    }
    Ok(())
}

fn extremes(since_hours: i64) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let records = store.all_records();

    match aggregate::extremes(records, None) {
        Ok(overall) => {
            println!(
                "Hottest city (overall): {} ({:.1}°C)",
                overall.hottest.0, overall.hottest.1
            );
            println!(
                "Coldest city (overall): {} ({:.1}°C)",
                overall.coldest.0, overall.coldest.1
            );
        }
        Err(AggregateError::Empty) => {
            println!("No weather data available.");
            return Ok(());
        }
    }

    let since = Utc::now() - Duration::hours(since_hours);
    match aggregate::extremes(records, Some(since)) {
        Ok(recent) => {
            println!(
                "Hottest city (last {since_hours}h): {} ({:.1}°C)",
                recent.hottest.0, recent.hottest.1
            );
            println!(
                "Coldest city (last {since_hours}h): {} ({:.1}°C)",
                recent.coldest.0, recent.coldest.1
            );
        }
        Err(AggregateError::Empty) => {
            println!("No records within the last {since_hours}h.");
        }
    }
    Ok(())
}

fn trend(city: &str) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;

    let key = LocationKey::new(city);
    let records = store.records_for(&key, None);
    if records.is_empty() {
        println!("No data available for {city}.");
        return Ok(());
    }

    let min = records.iter().map(|r| r.temperature_c).fold(f64::INFINITY, f64::min);
    let max = records.iter().map(|r| r.temperature_c).fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).max(0.1);

    println!("Temperature trend for {city}:");
    for record in &records {
        let width = (((record.temperature_c - min) / span) * 40.0).round() as usize;
        println!(
            "{}  {:>6.1}°C  {}",
            record.observed_at_local.format("%Y-%m-%d %H:%M"),
            record.temperature_c,
            "#".repeat(width.max(1)),
        );
    }
    println!("\n{} readings, min {min:.1}°C, max {max:.1}°C", records.len());
    Ok(())
}

async fn watch(cities: Vec<String>, interval_mins: u64) -> Result<()> {
    let config = Config::load()?;
    let provider = Arc::new(provider_from_config(&config)?) as Arc<dyn WeatherProvider>;
    let mut store = open_store(&config)?;

    println!("Watching: {}", cities.join(", "));
    println!("Interval: every {interval_mins} minutes. Press Ctrl-C to stop.");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_mins * 60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("\nScheduled fetch at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
                let summary =
                    fetch_and_store(Arc::clone(&provider), &mut store, &cities, true).await?;
                print_batch(&summary);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nScheduler stopped.");
                return Ok(());
            }
        }
    }
}
