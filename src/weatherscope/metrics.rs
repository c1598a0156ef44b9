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

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use crate::service::normalize_city;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

const NAMESPACE: &str = "weatherscope";
const OTHER_CITY: &str = "other";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum CallStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CityLabels {
    pub city: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CallLabels {
    pub city: String,
    pub status: CallStatus,
}

/// Holder for metrics emitted while fetching and storing readings.
///
/// All metrics are created and registered upon call to `WeatherMetrics::new()`. Metrics
/// share the prefix "weatherscope_" and have a "city" label set to the normalized city
/// name (e.g. `{city="paris"}`). Only configured cities get their own label, any other
/// city is counted under `{city="other"}` and does not set the per-city gauges. The struct
/// is cheap to clone, clones share the same underlying metrics.
#[derive(Debug, Clone)]
pub struct WeatherMetrics {
    cities: Arc<HashSet<String>>,
    api_calls: Family<CallLabels, Counter>,
    api_duration: Family<CityLabels, Histogram>,
    temperature: Family<CityLabels, Gauge<f64, AtomicU64>>,
    humidity: Family<CityLabels, Gauge<f64, AtomicU64>>,
    scheduled_updates: Family<CityLabels, Counter>,
}

impl WeatherMetrics {
    /// Create a new `WeatherMetrics` and register each metric with the provided `Registry`.
    ///
    /// `cities` are the configured city names, normalized before use as labels.
    pub fn new<S: AsRef<str>>(reg: &mut Registry, cities: &[S]) -> Self {
        let cities = cities.iter().map(|c| normalize_city(c.as_ref())).collect();
        let api_calls = Family::<CallLabels, Counter>::default();
        let api_duration: Family<CityLabels, Histogram> =
            Family::new_with_constructor(|| Histogram::new(exponential_buckets(0.05, 2.0, 8)));
        let temperature = Family::<CityLabels, Gauge<f64, AtomicU64>>::default();
        let humidity = Family::<CityLabels, Gauge<f64, AtomicU64>>::default();
        let scheduled_updates = Family::<CityLabels, Counter>::default();

        let sub = reg.sub_registry_with_prefix(NAMESPACE);
        sub.register("api_calls", "Weather API calls by outcome", api_calls.clone());
        sub.register(
            "api_duration_seconds",
            "Time taken to fetch and store a reading",
            api_duration.clone(),
        );
        sub.register("temperature_degrees", "Last stored temperature in celsius", temperature.clone());
        sub.register("relative_humidity", "Last stored relative humidity (0-100)", humidity.clone());
        sub.register(
            "scheduled_updates",
            "Successful scheduled updates",
            scheduled_updates.clone(),
        );

        Self {
            cities: Arc::new(cities),
            api_calls,
            api_duration,
            temperature,
            humidity,
            scheduled_updates,
        }
    }

    /// Record a successful fetch along with the values that were stored.
    pub fn success(&self, city: &str, elapsed: Duration, temperature: f64, humidity: f64) {
        self.call(city, CallStatus::Success);
        let labels = self.city_labels(city);
        self.api_duration.get_or_create(&labels).observe(elapsed.as_secs_f64());

        if self.cities.contains(city) {
            self.temperature.get_or_create(&labels).set(temperature);
            self.humidity.get_or_create(&labels).set(humidity);
        }
    }

    pub fn failure(&self, city: &str) {
        self.call(city, CallStatus::Error);
    }

    pub fn scheduled_update(&self, city: &str) {
        self.scheduled_updates.get_or_create(&self.city_labels(city)).inc();
    }

    fn call(&self, city: &str, status: CallStatus) {
        self.api_calls
            .get_or_create(&CallLabels {
                city: self.label(city),
                status,
            })
            .inc();
    }

    fn city_labels(&self, city: &str) -> CityLabels {
        CityLabels { city: self.label(city) }
    }

    fn label(&self, city: &str) -> String {
        if self.cities.contains(city) {
            city.to_owned()
        } else {
            OTHER_CITY.to_owned()
        }
    }
}

#[cfg(test)]
mod test {
    use super::WeatherMetrics;
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use std::time::Duration;

    #[test]
    fn test_success_sets_gauges_and_counts() {
        let mut registry = Registry::default();
        let metrics = WeatherMetrics::new(&mut registry, &[" Paris"]);
        metrics.success("paris", Duration::from_millis(120), 18.5, 64.0);
        metrics.failure("paris");
        metrics.scheduled_update("paris");

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains(r#"weatherscope_api_calls_total{city="paris",status="Success"} 1"#));
        assert!(buf.contains(r#"weatherscope_api_calls_total{city="paris",status="Error"} 1"#));
        assert!(buf.contains(r#"weatherscope_temperature_degrees{city="paris"} 18.5"#));
        assert!(buf.contains(r#"weatherscope_relative_humidity{city="paris"} 64"#));
        assert!(buf.contains(r#"weatherscope_scheduled_updates_total{city="paris"} 1"#));
        assert!(buf.contains(r#"weatherscope_api_duration_seconds_count{city="paris"} 1"#));
    }

    #[test]
    fn test_unconfigured_cities_share_label() {
        let mut registry = Registry::default();
        let metrics = WeatherMetrics::new(&mut registry, &["paris"]);
        metrics.failure("atlantis");
        metrics.failure("el dorado");
        metrics.success("lima", Duration::from_millis(80), 19.0, 77.0);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains(r#"weatherscope_api_calls_total{city="other",status="Error"} 2"#));
        assert!(buf.contains(r#"weatherscope_api_calls_total{city="other",status="Success"} 1"#));
        assert!(!buf.contains("atlantis"));
        assert!(!buf.contains("el dorado"));
        assert!(!buf.contains("lima"));
        assert!(!buf.contains("weatherscope_temperature_degrees{"));
    }
}
