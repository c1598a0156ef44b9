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

use crate::config::UpdaterConfig;
use crate::metrics::WeatherMetrics;
use crate::service::WeatherService;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Level};

/// Outcome of a single pass over every configured city.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub updated: usize,
    pub failed: usize,
}

/// Fetches and stores a reading for each configured city on a fixed interval.
///
/// Cities are updated one at a time, in the order they were configured. A failure
/// for one city is logged and does not prevent the remaining cities from being
/// updated. Ticks never overlap: if a tick runs longer than the interval, the next
/// one starts once it completes.
pub struct Updater {
    service: Arc<WeatherService>,
    config: UpdaterConfig,
    metrics: WeatherMetrics,
}

impl Updater {
    pub fn new(service: Arc<WeatherService>, config: UpdaterConfig, metrics: WeatherMetrics) -> Self {
        Updater {
            service,
            config,
            metrics,
        }
    }

    /// Run forever, starting with an immediate tick.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            message = "scheduled updates started",
            cities = self.config.cities().len(),
            interval_secs = self.config.interval().as_secs(),
        );

        loop {
            let _ = interval.tick().await;
            self.tick()
                .instrument(tracing::span!(Level::DEBUG, "weather_update"))
                .await;
        }
    }

    /// Update every configured city once.
    pub async fn tick(&self) -> TickSummary {
        tracing::info!(message = "starting scheduled weather update");
        let mut summary = TickSummary::default();

        for city in self.config.cities() {
            match self.service.fetch_and_persist(city).await {
                Ok(reading) => {
                    self.metrics.scheduled_update(&reading.city);
                    summary.updated += 1;
                    tracing::info!(message = "updated weather", city = %city);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(message = "failed to update weather", city = %city, error = %e);
                }
            }
        }

        tracing::info!(
            message = "finished scheduled weather update",
            updated = summary.updated,
            failed = summary.failed,
        );

        summary
    }
}
