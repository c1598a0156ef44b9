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

use std::time::Duration;

/// Default time between scheduled updates: 15 minutes.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(15 * 60);

/// Settings for the periodic updater, fixed once the process starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterConfig {
    cities: Vec<String>,
    interval: Duration,
}

impl UpdaterConfig {
    /// Build a configuration from a comma separated list of cities.
    pub fn new(cities: &str, interval: Duration) -> Self {
        UpdaterConfig {
            cities: parse_cities(cities),
            interval,
        }
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Split a comma separated list of cities. Entries are kept as written, apart from
/// blank entries which are dropped. Normalization happens when the city is fetched.
pub fn parse_cities(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|c| !c.trim().is_empty())
        .map(String::from)
        .collect()
}
