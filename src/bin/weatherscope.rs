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

use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;
use weatherscope::client::OpenWeatherClient;
use weatherscope::config::{UpdaterConfig, DEFAULT_REFRESH};
use weatherscope::http::RequestContext;
use weatherscope::metrics::WeatherMetrics;
use weatherscope::service::WeatherService;
use weatherscope::store::SqliteReadingStore;
use weatherscope::updater::Updater;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);
const DEFAULT_REFRESH_SECS: u64 = DEFAULT_REFRESH.as_secs();
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "https://api.openweathermap.org/";
const DEFAULT_DATABASE: &str = "weatherscope.db";

#[derive(Debug, Parser)]
#[clap(name = "weatherscope", version = clap::crate_version!())]
struct WeatherscopeApplication {
    /// Comma separated list of cities to fetch the weather for on a schedule
    #[clap(long, env = "WEATHER_CITIES")]
    cities: String,

    /// API key for OpenWeatherMap
    #[clap(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL for the OpenWeatherMap API
    #[clap(long, env = "OPENWEATHER_API_URL", default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Path to the SQLite database readings are stored in. Created if it doesn't exist.
    #[clap(long, env = "WEATHERSCOPE_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch the weather for each configured city at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    refresh_secs: u64,

    /// Timeout for fetching the weather from the OpenWeatherMap API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherscopeApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )?;

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = OpenWeatherClient::new(http_client, opts.api_url.clone(), opts.api_key).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize weather client", error = %e);
        process::exit(1)
    });

    let store = SqliteReadingStore::open(&opts.database).unwrap_or_else(|e| {
        tracing::error!(message = "unable to open database", path = %opts.database.display(), error = %e);
        process::exit(1)
    });

    let config = UpdaterConfig::new(&opts.cities, Duration::from_secs(opts.refresh_secs));
    let mut registry = Registry::default();
    let metrics = WeatherMetrics::new(&mut registry, config.cities());
    let service = Arc::new(WeatherService::new(client, Arc::new(store), metrics.clone()));

    tracing::info!(message = "weather polling configured", api_url = %opts.api_url, cities = ?config.cities());
    let updater = Updater::new(service.clone(), config, metrics);
    tokio::spawn(updater.run());

    let context = Arc::new(RequestContext::new(service, registry));
    let app = weatherscope::http::router(context);
    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());
    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
