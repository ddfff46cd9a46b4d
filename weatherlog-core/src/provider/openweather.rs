use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Local, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::fetcher::FetchOutcome;
use crate::model::WeatherRecord;

use super::WeatherProvider;

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Current-weather client for the OpenWeatherMap API.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, timeout, BASE_URL.to_string())
    }

    fn with_base_url(api_key: String, timeout: Duration, base_url: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for OpenWeather")?;

        Ok(Self { api_key, base_url, http })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current(&self, location: &str) -> FetchOutcome {
        let res = match self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => return FetchOutcome::TransientError(err.to_string()),
        };

        let status = res.status();
        let body = match res.text().await {
            Ok(body) => body,
            Err(err) => return FetchOutcome::TransientError(err.to_string()),
        };

        if !status.is_success() {
            return match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchOutcome::AuthError,
                StatusCode::NOT_FOUND => FetchOutcome::NotFound,
                _ => FetchOutcome::TransientError(format!(
                    "status {}: {}",
                    status,
                    truncate_body(&body),
                )),
            };
        }

        let parsed: OwCurrentResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(err) => {
                return FetchOutcome::MalformedResponse(format!(
                    "{}: {}",
                    err,
                    truncate_body(&body),
                ));
            }
        };

        let condition = parsed
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        // Stamp with our own clock; the provider timestamp is ignored so
        // that per-location observation times stay monotonic.
        let record = WeatherRecord {
            location: location.trim().to_string(),
            temperature_c: parsed.main.temp,
            condition,
            humidity_pct: parsed.main.humidity,
            observed_at_utc: Utc::now(),
            observed_at_local: Local::now(),
        };

        if let Err(err) = record.validate() {
            return FetchOutcome::MalformedResponse(err.to_string());
        }

        FetchOutcome::Success(record)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Back off to a char boundary; error bodies echo city names and can
    // carry multi-byte UTF-8.
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
