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

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    Transport(reqwest::Error),
    Status(StatusCode, String),
    Decode(serde_json::Error),
    MissingCondition,
    InvalidUrl(Url),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::Status(status, body) => write!(f, "unexpected status {}: {}", status, body),
            Self::Decode(e) => write!(f, "malformed weather response: {}", e),
            Self::MissingCondition => write!(f, "malformed weather response: no weather conditions"),
            Self::InvalidUrl(url) => write!(f, "invalid API base URL {}", url),
        }
    }
}

impl error::Error for FetchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// The subset of a current weather response that gets stored as a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub temperature: f64,
    pub humidity: f64,
    pub description: String,
}

/// Client for the OpenWeatherMap current weather API.
///
/// Each call to `current()` makes exactly one request. Retries, if any, are up
/// to the caller. Timeouts are whatever the provided `reqwest::Client` was built
/// with.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    weather_url: Url,
    api_key: String,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = "weatherscope (https://github.com/56quarters/weatherscope)";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new<S: Into<String>>(client: Client, base_url: Url, api_key: S) -> Result<Self, FetchError> {
        let mut weather_url = base_url.clone();
        weather_url
            .path_segments_mut()
            .map(|mut p| {
                p.pop_if_empty().push("data").push("2.5").push("weather");
            })
            .map_err(|_| FetchError::InvalidUrl(base_url))?;

        Ok(OpenWeatherClient {
            client,
            weather_url,
            api_key: api_key.into(),
        })
    }

    pub async fn current(&self, city: &str) -> Result<RawReading, FetchError> {
        tracing::debug!(message = "making current weather request", url = %self.weather_url, city = %city);

        let res = self
            .client
            .get(self.weather_url.clone())
            .query(&[("q", city), ("units", "metric"), ("appid", self.api_key.as_str())])
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = res.status();
        let body = res.text().await.map_err(FetchError::Transport)?;
        if !status.is_success() {
            return Err(FetchError::Status(status, body));
        }

        decode(&body)
    }
}

/// Parse a current weather response body, failing if any consumed field is missing.
pub fn decode(body: &str) -> Result<RawReading, FetchError> {
    let parsed: CurrentWeather = serde_json::from_str(body).map_err(FetchError::Decode)?;
    parsed.try_into()
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CurrentWeather {
    #[serde(alias = "main")]
    pub main: MainConditions,
    #[serde(alias = "weather")]
    pub weather: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MainConditions {
    #[serde(alias = "temp")]
    pub temperature: f64,
    #[serde(alias = "humidity")]
    pub humidity: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Condition {
    #[serde(alias = "description")]
    pub description: String,
}

impl TryFrom<CurrentWeather> for RawReading {
    type Error = FetchError;

    fn try_from(value: CurrentWeather) -> Result<Self, Self::Error> {
        let description = value
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or(FetchError::MissingCondition)?;

        Ok(RawReading {
            temperature: value.main.temperature,
            humidity: value.main.humidity,
            description,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{decode, FetchError, OpenWeatherClient, RawReading};
    use reqwest::{Client, Url};

    #[test]
    fn test_decode_full_response() {
        let body = r#"{
            "coord": {"lon": 2.35, "lat": 48.85},
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
            "main": {"temp": 21.4, "feels_like": 20.9, "pressure": 1015, "humidity": 56},
            "name": "Paris"
        }"#;

        let reading = decode(body).unwrap();
        assert_eq!(
            RawReading {
                temperature: 21.4,
                humidity: 56.0,
                description: "clear sky".to_owned(),
            },
            reading
        );
    }

    #[test]
    fn test_decode_first_condition_wins() {
        let body = r#"{
            "weather": [{"description": "light rain"}, {"description": "mist"}],
            "main": {"temp": 9, "humidity": 93.5}
        }"#;

        let reading = decode(body).unwrap();
        assert_eq!("light rain", reading.description);
        assert_eq!(9.0, reading.temperature);
    }

    #[test]
    fn test_decode_empty_conditions() {
        let body = r#"{"weather": [], "main": {"temp": 1.0, "humidity": 2.0}}"#;
        assert!(matches!(decode(body), Err(FetchError::MissingCondition)));
    }

    #[test]
    fn test_decode_missing_main() {
        let body = r#"{"weather": [{"description": "fog"}]}"#;
        assert!(matches!(decode(body), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_decode_mistyped_temperature() {
        let body = r#"{"weather": [{"description": "fog"}], "main": {"temp": "warm", "humidity": 2.0}}"#;
        assert!(matches!(decode(body), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(matches!(decode(""), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_weather_url_with_path_prefix() {
        let base = Url::parse("http://localhost:8000/proxy/").unwrap();
        let client = OpenWeatherClient::new(Client::new(), base, "key").unwrap();
        assert_eq!("/proxy/data/2.5/weather", client.weather_url.path());
    }

    #[test]
    fn test_weather_url_cannot_be_base() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        let res = OpenWeatherClient::new(Client::new(), base, "key");
        assert!(matches!(res, Err(FetchError::InvalidUrl(_))));
    }
}
