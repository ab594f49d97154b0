//! Forecast client for the Open-Meteo API.
//!
//! Resolves a city name to coordinates through the city directory, fetches
//! current and daily variables through a retrying HTTP client, and reshapes
//! the response into a date-keyed table for rendering. Responses are cached
//! by rounded coordinates so repeated lookups inside the expiry window do
//! not hit the provider again.

use crate::cache::ResponseCache;
use crate::cities::{CityDirectory, Coords};
use crate::config::WeatherConfig;
use crate::{CitycastError, Result};
use chrono::NaiveDate;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Current-instant variables requested from the provider, in order.
const CURRENT_VARIABLES: &str =
    "temperature_2m,apparent_temperature,precipitation,rain,showers,snowfall";

/// Daily variables requested from the provider, in order.
const DAILY_VARIABLES: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_hours,precipitation_probability_max";

/// Current-instant readings attached to the forecast table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub precipitation: f64,
    pub rain: f64,
    pub showers: f64,
    pub snowfall: f64,
}

/// One row of the forecast table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature_max: f64,
    pub temperature_min: f64,
    pub precipitation_hours: f64,
    pub precipitation_probability_max: f64,
}

/// Forecast table keyed by date.
///
/// The two current temperature readings apply to every row; they are kept
/// once here and broadcast at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastTable {
    pub city: String,
    pub current: CurrentConditions,
    pub days: Vec<DailyForecast>,
}

/// HTTP client for the forecast provider.
pub struct ForecastClient {
    http: ClientWithMiddleware,
    directory: CityDirectory,
    cache: ResponseCache,
    base_url: String,
    cache_expiry: Duration,
}

impl ForecastClient {
    /// Create a new forecast client.
    ///
    /// Retry/backoff on transient failures is delegated to the middleware
    /// stack; the retry budget and timeout come from configuration.
    pub fn new(
        config: &WeatherConfig,
        directory: CityDirectory,
        cache: ResponseCache,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("citycast/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let http = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            http,
            directory,
            cache,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache_expiry: Duration::from_secs(config.cache_expiry_seconds),
        })
    }

    /// Fetch the forecast table for a named city.
    ///
    /// Fails with `CityNotFound` when the directory has no entry for the
    /// name, and with an API error when the provider call fails.
    #[instrument(skip(self))]
    pub async fn get_forecast(&self, city_name: &str) -> Result<ForecastTable> {
        let coords = self
            .directory
            .coords_by_name(city_name)?
            .ok_or_else(|| CitycastError::city_not_found(city_name))?;

        let key = cache_key(&coords);
        if let Some(cached) = self
            .cache
            .get::<openmeteo::ForecastResponse>(&key)
            .await?
        {
            debug!(%key, "Forecast served from cache");
            return reshape(city_name, &cached);
        }

        let response = self.fetch(&coords).await?;
        self.cache
            .put(&key, response.clone(), self.cache_expiry)
            .await?;

        reshape(city_name, &response)
    }

    async fn fetch(&self, coords: &Coords) -> Result<openmeteo::ForecastResponse> {
        let url = format!(
            "{}/forecast?latitude={}&longitude={}&current={}&daily={}&timezone=auto",
            self.base_url, coords.lat, coords.lon, CURRENT_VARIABLES, DAILY_VARIABLES
        );
        debug!(%url, "Requesting forecast");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CitycastError::api(format!(
                "weather API returned HTTP {status}"
            )));
        }

        let body: openmeteo::ForecastResponse = response.json().await?;
        info!(days = body.daily.as_ref().map_or(0, |d| d.time.len()), "Forecast received");
        Ok(body)
    }
}

/// Cache key for a coordinate pair, rounded so nearby requests share an
/// entry.
fn cache_key(coords: &Coords) -> String {
    format!("forecast:{:.2}:{:.2}", coords.lat, coords.lon)
}

/// Reshape a provider response into the date-keyed table.
fn reshape(city: &str, response: &openmeteo::ForecastResponse) -> Result<ForecastTable> {
    let current = response
        .current
        .as_ref()
        .ok_or_else(|| CitycastError::api("no current conditions in weather response"))?;
    let daily = response
        .daily
        .as_ref()
        .ok_or_else(|| CitycastError::api("no daily data in weather response"))?;

    let mut days = Vec::with_capacity(daily.time.len());
    for i in 0..daily.time.len() {
        let date = NaiveDate::parse_from_str(&daily.time[i], "%Y-%m-%d")
            .map_err(|e| CitycastError::api(format!("bad date in weather response: {e}")))?;

        days.push(DailyForecast {
            date,
            temperature_max: value_at(&daily.temperature_max, i),
            temperature_min: value_at(&daily.temperature_min, i),
            precipitation_hours: value_at(&daily.precipitation_hours, i),
            precipitation_probability_max: value_at(&daily.precipitation_probability_max, i),
        });
    }

    Ok(ForecastTable {
        city: city.to_string(),
        current: CurrentConditions {
            temperature: current.temperature,
            apparent_temperature: current.apparent_temperature,
            precipitation: current.precipitation,
            rain: current.rain,
            showers: current.showers,
            snowfall: current.snowfall,
        },
        days,
    })
}

// Safe indexing with a neutral default; providers occasionally ship
// shorter arrays than the time axis.
fn value_at(values: &Option<Vec<Option<f64>>>, index: usize) -> f64 {
    values
        .as_ref()
        .and_then(|v| v.get(index).copied().flatten())
        .unwrap_or(0.0)
}

/// Open-Meteo API response structures
pub(crate) mod openmeteo {
    use serde::{Deserialize, Serialize};

    /// Forecast response with current and daily blocks
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ForecastResponse {
        pub latitude: f64,
        pub longitude: f64,
        pub current: Option<CurrentData>,
        pub daily: Option<DailyData>,
    }

    /// Current weather block
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CurrentData {
        #[serde(rename = "temperature_2m")]
        pub temperature: f64,
        pub apparent_temperature: f64,
        pub precipitation: f64,
        pub rain: f64,
        pub showers: f64,
        pub snowfall: f64,
    }

    /// Daily weather block
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DailyData {
        pub time: Vec<String>,
        #[serde(rename = "temperature_2m_max")]
        pub temperature_max: Option<Vec<Option<f64>>>,
        #[serde(rename = "temperature_2m_min")]
        pub temperature_min: Option<Vec<Option<f64>>>,
        pub precipitation_hours: Option<Vec<Option<f64>>>,
        pub precipitation_probability_max: Option<Vec<Option<f64>>>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> openmeteo::ForecastResponse {
        serde_json::from_str(
            r#"{
                "latitude": 55.75,
                "longitude": 37.62,
                "current": {
                    "temperature_2m": 21.4,
                    "apparent_temperature": 19.8,
                    "precipitation": 0.0,
                    "rain": 0.0,
                    "showers": 0.0,
                    "snowfall": 0.0
                },
                "daily": {
                    "time": ["2026-08-05", "2026-08-06", "2026-08-07"],
                    "temperature_2m_max": [24.1, 26.0, 22.7],
                    "temperature_2m_min": [14.2, 15.9, 13.0],
                    "precipitation_hours": [0.0, 2.0, 5.0],
                    "precipitation_probability_max": [10.0, 45.0, 80.0]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn reshape_produces_one_row_per_day() {
        let table = reshape("Москва", &sample_response()).unwrap();
        assert_eq!(table.city, "Москва");
        assert_eq!(table.days.len(), 3);
        assert_eq!(
            table.days[0].date,
            NaiveDate::from_ymd_opt(2026, 8, 5).unwrap()
        );
        assert_eq!(table.days[1].temperature_max, 26.0);
        assert_eq!(table.days[2].precipitation_probability_max, 80.0);
    }

    #[test]
    fn reshape_attaches_current_scalars() {
        let table = reshape("Москва", &sample_response()).unwrap();
        assert_eq!(table.current.temperature, 21.4);
        assert_eq!(table.current.apparent_temperature, 19.8);
    }

    #[test]
    fn reshape_without_current_is_an_api_error() {
        let mut response = sample_response();
        response.current = None;
        let err = reshape("Москва", &response).unwrap_err();
        assert!(matches!(err, CitycastError::Api { .. }));
    }

    #[test]
    fn reshape_without_daily_is_an_api_error() {
        let mut response = sample_response();
        response.daily = None;
        assert!(reshape("Москва", &response).is_err());
    }

    #[test]
    fn short_value_arrays_fall_back_to_zero() {
        let mut response = sample_response();
        if let Some(daily) = response.daily.as_mut() {
            daily.precipitation_hours = Some(vec![Some(1.0)]);
        }
        let table = reshape("Москва", &response).unwrap();
        assert_eq!(table.days[0].precipitation_hours, 1.0);
        assert_eq!(table.days[2].precipitation_hours, 0.0);
    }

    #[test]
    fn null_values_fall_back_to_zero() {
        let mut response = sample_response();
        if let Some(daily) = response.daily.as_mut() {
            daily.temperature_max = Some(vec![None, Some(26.0), Some(22.7)]);
        }
        let table = reshape("Москва", &response).unwrap();
        assert_eq!(table.days[0].temperature_max, 0.0);
        assert_eq!(table.days[1].temperature_max, 26.0);
    }

    #[test]
    fn cache_key_rounds_coordinates() {
        let key = cache_key(&Coords {
            lat: 55.755833,
            lon: 37.617778,
        });
        assert_eq!(key, "forecast:55.76:37.62");
    }
}
