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

//! Weather readings collector and query service
//!
//! ## Features
//!
//! `weatherscope` fetches the current weather for a list of cities from the [OpenWeatherMap]
//! API on a fixed interval, stores each result as a reading in a local SQLite database, and
//! serves the stored readings over HTTP.
//!
//! * `GET /{city}` - Fetch and store the current weather for a city, returning the new reading.
//! * `GET /history/{city}` - The ten most recent readings for a city, newest first.
//! * `GET /trends/{city}?days=N` - All readings for a city from the last `N` days, oldest first.
//! * `GET /avg/{city}?days=N` - Average temperature for a city over the last `N` days.
//! * `GET /metrics` - Prometheus metrics about API calls and the last stored values.
//!
//! City names are trimmed and lower-cased before use so `" Paris "` and `"paris"` refer to
//! the same readings. `N` must be between 1 and 365.
//!
//! [OpenWeatherMap]: https://openweathermap.org/current
//!
//! ## Build
//!
//! `weatherscope` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/weatherscope.git && cd weatherscope
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! An OpenWeatherMap API key is required. Cities to update on a schedule are given as a comma
//! separated list.
//!
//! ```text
//! OPENWEATHER_API_KEY=... ./weatherscope --cities 'London,Paris,Kyiv'
//! ```
//!
//! Readings are stored in `weatherscope.db` in the current directory unless `--database` is
//! used to pick another path. The HTTP server listens on port `8080` by default.
//!
//! ### Prometheus
//!
//! Metrics are exposed at `/metrics`. Add the host running `weatherscope` as a target under
//! the Prometheus `scrape_configs` section.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: weatherscope
//!   static_configs:
//!   - targets: ['example:8080']
//! ```
//!

pub mod client;
pub mod config;
pub mod http;
pub mod metrics;
pub mod service;
pub mod store;
pub mod updater;
