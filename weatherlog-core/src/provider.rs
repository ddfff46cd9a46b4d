use std::fmt::Debug;

use async_trait::async_trait;

use crate::config::Config;
use crate::fetcher::FetchOutcome;

pub mod openweather;

use openweather::OpenWeatherProvider;

/// Abstraction over a remote current-weather service.
///
/// Implementations stamp `observed_at_utc` from their own clock at the
/// moment of a successful parse, never from the remote payload, and map
/// every failure onto a non-success [`FetchOutcome`] instead of returning
/// an error.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current(&self, location: &str) -> FetchOutcome;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = config.api_key()?;
    OpenWeatherProvider::new(api_key.to_owned(), config.request_timeout())
}
