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

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::error;
use std::fmt;
use std::path::Path;

/// A weather observation that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub city: String,
    pub temperature: f64,
    pub humidity: f64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// A persisted weather observation. Readings are never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub id: i64,
    pub city: String,
    pub temperature: f64,
    pub humidity: f64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidTimestamp(i64),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "{}", e),
            Self::InvalidTimestamp(ts) => write!(f, "invalid stored timestamp {}", ts),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

/// Append-only storage of readings. Every query is scoped to a single,
/// already normalized, city.
pub trait ReadingStore: Send + Sync {
    /// Persist a reading, assigning it an ID.
    fn insert(&self, reading: NewReading) -> Result<Reading, StoreError>;

    /// At most `limit` readings for `city`, newest first.
    fn recent(&self, city: &str, limit: usize) -> Result<Vec<Reading>, StoreError>;

    /// All readings for `city` taken at or after `from`, oldest first.
    fn since(&self, city: &str, from: DateTime<Utc>) -> Result<Vec<Reading>, StoreError>;

    /// Mean temperature of the readings `since()` would return, `None` if there are none.
    fn average_temperature_since(&self, city: &str, from: DateTime<Utc>) -> Result<Option<f64>, StoreError>;
}

/// `ReadingStore` backed by a single SQLite connection.
pub struct SqliteReadingStore {
    conn: Mutex<Connection>,
}

impl SqliteReadingStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL,
                temperature REAL NOT NULL,
                humidity REAL NOT NULL,
                description TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_city_timestamp ON readings(city, timestamp_ms);
            "#,
        )?;

        Ok(SqliteReadingStore { conn: Mutex::new(conn) })
    }

    fn select<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Reading>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| Ok(Self::row_to_reading(row)))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }

        Ok(out)
    }

    fn row_to_reading(row: &Row) -> Result<Reading, StoreError> {
        Ok(Reading {
            id: row.get(0)?,
            city: row.get(1)?,
            temperature: row.get(2)?,
            humidity: row.get(3)?,
            description: row.get(4)?,
            timestamp: from_millis(row.get(5)?)?,
        })
    }
}

fn from_millis(timestamp_ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or(StoreError::InvalidTimestamp(timestamp_ms))
}

impl ReadingStore for SqliteReadingStore {
    fn insert(&self, reading: NewReading) -> Result<Reading, StoreError> {
        // Returned rows carry the same millisecond precision as rows read back later
        let timestamp_ms = reading.timestamp.timestamp_millis();
        let timestamp = from_millis(timestamp_ms)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO readings (city, temperature, humidity, description, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                reading.city,
                reading.temperature,
                reading.humidity,
                reading.description,
                timestamp_ms,
            ],
        )?;

        Ok(Reading {
            id: conn.last_insert_rowid(),
            city: reading.city,
            temperature: reading.temperature,
            humidity: reading.humidity,
            description: reading.description,
            timestamp,
        })
    }

    fn recent(&self, city: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        self.select(
            "SELECT id, city, temperature, humidity, description, timestamp_ms
             FROM readings
             WHERE city = ?1
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?2",
            params![city, limit as i64],
        )
    }

    fn since(&self, city: &str, from: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        self.select(
            "SELECT id, city, temperature, humidity, description, timestamp_ms
             FROM readings
             WHERE city = ?1 AND timestamp_ms >= ?2
             ORDER BY timestamp_ms ASC, id ASC",
            params![city, from.timestamp_millis()],
        )
    }

    fn average_temperature_since(&self, city: &str, from: DateTime<Utc>) -> Result<Option<f64>, StoreError> {
        let conn = self.conn.lock();
        let avg = conn.query_row(
            "SELECT AVG(temperature) FROM readings WHERE city = ?1 AND timestamp_ms >= ?2",
            params![city, from.timestamp_millis()],
            |row| row.get::<_, Option<f64>>(0),
        )?;

        Ok(avg)
    }
}

#[cfg(test)]
mod test {
    use super::{NewReading, ReadingStore, SqliteReadingStore};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn reading(city: &str, temperature: f64, timestamp: DateTime<Utc>) -> NewReading {
        NewReading {
            city: city.to_owned(),
            temperature,
            humidity: 50.0,
            description: "overcast clouds".to_owned(),
            timestamp,
        }
    }

    #[test]
    fn test_insert_assigns_ids() {
        let store = SqliteReadingStore::in_memory().unwrap();
        let first = store.insert(reading("paris", 10.0, at(0))).unwrap();
        let second = store.insert(reading("paris", 11.0, at(1))).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!("paris", first.city);
        assert_eq!(at(0), first.timestamp);
    }

    #[test]
    fn test_recent_newest_first_and_limited() {
        let store = SqliteReadingStore::in_memory().unwrap();
        for i in 0..5 {
            store.insert(reading("oslo", i as f64, at(i))).unwrap();
        }

        let recent = store.recent("oslo", 3).unwrap();
        let temps: Vec<f64> = recent.iter().map(|r| r.temperature).collect();
        assert_eq!(vec![4.0, 3.0, 2.0], temps);
    }

    #[test]
    fn test_recent_unknown_city() {
        let store = SqliteReadingStore::in_memory().unwrap();
        store.insert(reading("oslo", 1.0, at(0))).unwrap();
        assert!(store.recent("lima", 10).unwrap().is_empty());
    }

    #[test]
    fn test_since_is_inclusive_and_ascending() {
        let store = SqliteReadingStore::in_memory().unwrap();
        store.insert(reading("rome", 3.0, at(300))).unwrap();
        store.insert(reading("rome", 1.0, at(100))).unwrap();
        store.insert(reading("rome", 2.0, at(200))).unwrap();
        store.insert(reading("milan", 9.0, at(250))).unwrap();

        let since = store.since("rome", at(200)).unwrap();
        let temps: Vec<f64> = since.iter().map(|r| r.temperature).collect();
        assert_eq!(vec![2.0, 3.0], temps);
    }

    #[test]
    fn test_average_since() {
        let store = SqliteReadingStore::in_memory().unwrap();
        store.insert(reading("kyiv", 100.0, at(0))).unwrap();
        store.insert(reading("kyiv", 10.0, at(60))).unwrap();
        store.insert(reading("kyiv", 20.0, at(120))).unwrap();

        let avg = store.average_temperature_since("kyiv", at(60)).unwrap();
        assert_eq!(Some(15.0), avg);
    }

    #[test]
    fn test_average_no_readings_is_none() {
        let store = SqliteReadingStore::in_memory().unwrap();
        store.insert(reading("kyiv", 0.0, at(0) - Duration::days(2))).unwrap();

        assert_eq!(None, store.average_temperature_since("kyiv", at(0)).unwrap());
        assert_eq!(None, store.average_temperature_since("nowhere", at(0)).unwrap());
    }

    #[test]
    fn test_average_of_zero_is_not_none() {
        let store = SqliteReadingStore::in_memory().unwrap();
        store.insert(reading("nuuk", 0.0, at(0))).unwrap();
        assert_eq!(Some(0.0), store.average_temperature_since("nuuk", at(0)).unwrap());
    }
}
