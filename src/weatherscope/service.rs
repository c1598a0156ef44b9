// weatherscope - Weather readings collector and query service
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{FetchError, OpenWeatherClient};
use crate::metrics::WeatherMetrics;
use crate::store::{NewReading, Reading, ReadingStore, StoreError};
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use std::error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{Instrument, Level};

/// Number of readings returned by `WeatherService::history()`.
pub const HISTORY_LIMIT: usize = 10;

/// Canonical form of a city name used as the storage key: trimmed and lower-cased.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// Mean temperature for a city over a number of days, `None` when nothing was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageResult {
    pub city: String,
    pub days: u32,
    pub average_temperature: Option<f64>,
}

#[derive(Debug)]
pub enum ServiceError {
    /// The weather API could not produce a reading. Reported to clients with `status`.
    Provider {
        status: StatusCode,
        message: String,
        cause: FetchError,
    },
    Store(StoreError),
    /// A blocking store operation panicked or was cancelled.
    Task(JoinError),
}

impl ServiceError {
    fn provider(city: &str, cause: FetchError) -> Self {
        let message = match &cause {
            FetchError::Status(status, _) => format!("API error: {}", status),
            _ => format!("Failed to fetch weather data for {}", city),
        };

        ServiceError::Provider {
            status: StatusCode::BAD_REQUEST,
            message,
            cause,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider { message, cause, .. } => write!(f, "{}: {}", message, cause),
            Self::Store(e) => write!(f, "storage error: {}", e),
            Self::Task(e) => write!(f, "storage task failed: {}", e),
        }
    }
}

impl error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Provider { cause, .. } => Some(cause),
            Self::Store(e) => Some(e),
            Self::Task(e) => Some(e),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

/// Fetches readings from the weather API, stores them, and answers queries about
/// stored readings. City names are normalized with `normalize_city()` before being
/// sent to the API or used to store or look up readings.
pub struct WeatherService {
    client: OpenWeatherClient,
    store: Arc<dyn ReadingStore>,
    metrics: WeatherMetrics,
}

impl WeatherService {
    pub fn new(client: OpenWeatherClient, store: Arc<dyn ReadingStore>, metrics: WeatherMetrics) -> Self {
        WeatherService { client, store, metrics }
    }

    /// Fetch the current weather for `city` and store it as a new reading.
    ///
    /// A single request is made to the weather API, failures are not retried.
    pub async fn fetch_and_persist(&self, city: &str) -> Result<Reading, ServiceError> {
        let city = normalize_city(city);
        let start = Instant::now();

        let raw = match self
            .client
            .current(&city)
            .instrument(tracing::span!(Level::DEBUG, "weather_fetch"))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.failure(&city);
                tracing::error!(message = "failed to fetch weather", city = %city, error = %e);
                return Err(ServiceError::provider(&city, e));
            }
        };

        let reading = NewReading {
            city: city.clone(),
            temperature: raw.temperature,
            humidity: raw.humidity,
            description: raw.description,
            timestamp: Utc::now(),
        };

        let stored = match self.blocking(move |store| store.insert(reading)).await {
            Ok(stored) => stored,
            Err(e) => {
                self.metrics.failure(&city);
                tracing::error!(message = "failed to store reading", city = %city, error = %e);
                return Err(e);
            }
        };

        self.metrics
            .success(&city, start.elapsed(), stored.temperature, stored.humidity);
        tracing::info!(
            message = "stored weather reading",
            city = %city,
            id = stored.id,
            temperature = stored.temperature,
            description = %stored.description,
        );

        Ok(stored)
    }

    /// Mean temperature of readings for `city` taken within the last `days` days.
    pub async fn average(&self, city: &str, days: u32) -> Result<AverageResult, ServiceError> {
        let city = normalize_city(city);
        let from = Utc::now() - Duration::days(i64::from(days));
        let key = city.clone();
        let average_temperature = self
            .blocking(move |store| store.average_temperature_since(&key, from))
            .await?;

        Ok(AverageResult {
            city,
            days,
            average_temperature,
        })
    }

    /// Readings for `city` taken within the last `days` days, oldest first.
    pub async fn trend(&self, city: &str, days: u32) -> Result<Vec<Reading>, ServiceError> {
        let city = normalize_city(city);
        let from = Utc::now() - Duration::days(i64::from(days));
        self.blocking(move |store| store.since(&city, from)).await
    }

    /// The most recent readings for `city`, newest first.
    pub async fn history(&self, city: &str) -> Result<Vec<Reading>, ServiceError> {
        let city = normalize_city(city);
        tracing::debug!(message = "fetching reading history", city = %city);
        self.blocking(move |store| store.recent(&city, HISTORY_LIMIT)).await
    }

    /// Run a store operation on the blocking thread pool so SQLite calls never stall
    /// the async runtime.
    async fn blocking<T, F>(&self, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&dyn ReadingStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(ServiceError::Task)?
            .map_err(ServiceError::Store)
    }
}

#[cfg(test)]
mod test {
    use super::{normalize_city, ServiceError};
    use crate::client::FetchError;
    use reqwest::StatusCode;

    #[test]
    fn test_normalize_city() {
        assert_eq!("paris", normalize_city(" Paris "));
        assert_eq!("paris", normalize_city("paris"));
        assert_eq!("new york", normalize_city("\tNEW York\n"));
        assert_eq!("", normalize_city("   "));
    }

    #[test]
    fn test_normalize_city_idempotent() {
        for city in [" Paris ", "SÃO PAULO", "  los Angeles", "kyiv", ""] {
            let once = normalize_city(city);
            assert_eq!(once, normalize_city(&once));
        }
    }

    #[test]
    fn test_provider_error_status_message() {
        let err = ServiceError::provider(
            "paris",
            FetchError::Status(StatusCode::UNAUTHORIZED, "{}".to_owned()),
        );

        match err {
            ServiceError::Provider { status, message, .. } => {
                assert_eq!(StatusCode::BAD_REQUEST, status);
                assert_eq!("API error: 401 Unauthorized", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_provider_error_decode_message() {
        let err = ServiceError::provider("paris", FetchError::MissingCondition);

        match err {
            ServiceError::Provider { status, message, .. } => {
                assert_eq!(StatusCode::BAD_REQUEST, status);
                assert_eq!("Failed to fetch weather data for paris", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
