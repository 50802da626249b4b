//! SQLite persistence: WAL mode, 4 tables, indexed queries.
//!
//! Schema: devices, positions, events, raw_logs.
//! Every received frame lands in raw_logs whether or not it decoded.
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text, which sorts.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use serde::Serialize;
use std::path::Path;

use gpsgate_core::tracker::TrackEvent;
use gpsgate_core::types::format_timestamp;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    imei TEXT PRIMARY KEY,
    format TEXT,
    status TEXT NOT NULL DEFAULT 'online',
    current_state TEXT,
    state_start_time TEXT,
    last_alarm TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    imei TEXT NOT NULL REFERENCES devices(imei),
    format TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    speed REAL,
    direction REAL,
    altitude REAL,
    gps_status TEXT,
    fuel_tank1 REAL,
    fuel_tank2 REAL,
    alarm TEXT,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    imei TEXT NOT NULL REFERENCES devices(imei),
    event_type TEXT NOT NULL,
    description TEXT,
    lat REAL,
    lon REAL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    peer TEXT,
    decoded INTEGER NOT NULL DEFAULT 0,
    received_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_positions_imei ON positions(imei);
CREATE INDEX IF NOT EXISTS idx_positions_timestamp ON positions(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_imei ON events(imei);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_raw_logs_received ON raw_logs(received_at);
CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON devices(last_seen);
"#;

/// SQLite database for tracker devices, positions, and raw frames.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> SqlResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = Path::new(path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            Connection::open(path)?
        };

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Database { conn })
    }

    /// Open in-memory database (for testing).
    #[cfg(test)]
    pub fn open_memory() -> SqlResult<Self> {
        Self::open(":memory:")
    }

    // -----------------------------------------------------------------------
    // Apply track events
    // -----------------------------------------------------------------------

    /// Persist a batch of TrackEvents from the tracker in one transaction.
    pub fn apply_events(&mut self, events: &[TrackEvent]) -> SqlResult<()> {
        let tx = self.conn.transaction()?;
        for event in events {
            match event {
                TrackEvent::NewDevice { imei, timestamp } => {
                    let ts = format_timestamp(timestamp);
                    tx.execute(
                        "INSERT INTO devices (imei, first_seen, last_seen) VALUES (?1, ?2, ?2)
                         ON CONFLICT(imei) DO NOTHING",
                        params![imei, ts],
                    )?;
                }
                TrackEvent::DeviceSeen {
                    imei, timestamp, ..
                } => {
                    let ts = format_timestamp(timestamp);
                    tx.execute(
                        "INSERT INTO devices (imei, first_seen, last_seen, message_count)
                         VALUES (?1, ?2, ?2, 1)
                         ON CONFLICT(imei) DO UPDATE SET
                             status = 'online',
                             message_count = message_count + 1,
                             last_seen = MAX(last_seen, excluded.last_seen)",
                        params![imei, ts],
                    )?;
                }
                TrackEvent::PositionUpdate {
                    imei,
                    format,
                    lat,
                    lon,
                    speed,
                    direction,
                    altitude,
                    gps_status,
                    fuel_tank1,
                    fuel_tank2,
                    alarm,
                    timestamp,
                } => {
                    tx.execute(
                        "INSERT INTO positions (imei, format, lat, lon, speed, direction, altitude, gps_status, fuel_tank1, fuel_tank2, alarm, timestamp)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        params![
                            imei,
                            format.as_str(),
                            lat,
                            lon,
                            speed,
                            direction,
                            altitude,
                            gps_status,
                            fuel_tank1,
                            fuel_tank2,
                            alarm.map(|a| a.as_str()),
                            format_timestamp(timestamp)
                        ],
                    )?;
                    tx.execute(
                        "UPDATE devices SET format = ?1 WHERE imei = ?2",
                        params![format.as_str(), imei],
                    )?;
                }
                TrackEvent::StateChange {
                    imei,
                    from,
                    to,
                    timestamp,
                } => {
                    let ts = format_timestamp(timestamp);
                    tx.execute(
                        "UPDATE devices SET current_state = ?1, state_start_time = ?2 WHERE imei = ?3",
                        params![to.as_str(), ts, imei],
                    )?;
                    let description = match from {
                        Some(from) => format!("{from} -> {to}"),
                        None => format!("-> {to}"),
                    };
                    tx.execute(
                        "INSERT INTO events (imei, event_type, description, timestamp)
                         VALUES (?1, 'state_change', ?2, ?3)",
                        params![imei, description, ts],
                    )?;
                }
                TrackEvent::Alarm {
                    imei,
                    alarm,
                    lat,
                    lon,
                    timestamp,
                } => {
                    let ts = format_timestamp(timestamp);
                    tx.execute(
                        "UPDATE devices SET last_alarm = ?1 WHERE imei = ?2",
                        params![alarm.as_str(), imei],
                    )?;
                    tx.execute(
                        "INSERT INTO events (imei, event_type, description, lat, lon, timestamp)
                         VALUES (?1, 'alarm', ?2, ?3, ?4, ?5)",
                        params![imei, alarm.as_str(), lat, lon, ts],
                    )?;
                }
            }
        }
        tx.commit()
    }

    // -----------------------------------------------------------------------
    // Raw logs
    // -----------------------------------------------------------------------

    /// Record a frame exactly as received. Returns the row id.
    pub fn log_raw(
        &mut self,
        payload: &str,
        peer: Option<&str>,
        decoded: bool,
        received_at: &NaiveDateTime,
    ) -> SqlResult<i64> {
        self.conn.execute(
            "INSERT INTO raw_logs (payload, peer, decoded, received_at) VALUES (?1, ?2, ?3, ?4)",
            params![payload, peer, decoded as i32, format_timestamp(received_at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Devices
    // -----------------------------------------------------------------------

    pub fn get_device(&self, imei: &str) -> SqlResult<Option<DeviceRow>> {
        self.conn
            .query_row(
                "SELECT imei, format, status, current_state, state_start_time, last_alarm, message_count, first_seen, last_seen
                 FROM devices WHERE imei = ?1",
                params![imei],
                device_row,
            )
            .optional()
    }

    /// All devices ordered by last_seen DESC.
    pub fn get_all_devices(&self) -> SqlResult<Vec<DeviceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT imei, format, status, current_state, state_start_time, last_alarm, message_count, first_seen, last_seen
             FROM devices ORDER BY last_seen DESC",
        )?;
        let rows = stmt.query_map([], device_row)?;
        rows.collect()
    }

    /// Mark devices silent since before `cutoff` as offline. Returns rows changed.
    pub fn mark_offline(&mut self, cutoff: &NaiveDateTime) -> SqlResult<usize> {
        self.conn.execute(
            "UPDATE devices SET status = 'offline' WHERE last_seen < ?1 AND status != 'offline'",
            params![format_timestamp(cutoff)],
        )
    }

    // -----------------------------------------------------------------------
    // Positions
    // -----------------------------------------------------------------------

    /// Most recent positions for a device, newest first.
    pub fn get_positions(&self, imei: &str, limit: i64) -> SqlResult<Vec<PositionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT imei, format, lat, lon, speed, direction, altitude, gps_status, fuel_tank1, fuel_tank2, alarm, timestamp
             FROM positions WHERE imei = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![imei, limit], |r| {
            Ok(PositionRow {
                imei: r.get(0)?,
                format: r.get(1)?,
                lat: r.get(2)?,
                lon: r.get(3)?,
                speed: r.get(4)?,
                direction: r.get(5)?,
                altitude: r.get(6)?,
                gps_status: r.get(7)?,
                fuel_tank1: r.get(8)?,
                fuel_tank2: r.get(9)?,
                alarm: r.get(10)?,
                timestamp: r.get(11)?,
            })
        })?;
        rows.collect()
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Recent events, optionally for one device, newest first.
    pub fn get_events(&self, imei: Option<&str>, limit: i64) -> SqlResult<Vec<EventRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, imei, event_type, description, lat, lon, timestamp
             FROM events WHERE (?1 IS NULL OR imei = ?1)
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![imei, limit], |r| {
            Ok(EventRow {
                id: r.get(0)?,
                imei: r.get(1)?,
                event_type: r.get(2)?,
                description: r.get(3)?,
                lat: r.get(4)?,
                lon: r.get(5)?,
                timestamp: r.get(6)?,
            })
        })?;
        rows.collect()
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    fn count(&self, table: &str) -> i64 {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            devices: self.count("devices"),
            positions: self.count("positions"),
            events: self.count("events"),
            raw_logs: self.count("raw_logs"),
            undecoded: self
                .conn
                .query_row("SELECT COUNT(*) FROM raw_logs WHERE decoded = 0", [], |r| {
                    r.get(0)
                })
                .unwrap_or(0),
        }
    }
}

fn device_row(r: &rusqlite::Row<'_>) -> SqlResult<DeviceRow> {
    Ok(DeviceRow {
        imei: r.get(0)?,
        format: r.get(1)?,
        status: r.get(2)?,
        current_state: r.get(3)?,
        state_start_time: r.get(4)?,
        last_alarm: r.get(5)?,
        message_count: r.get(6)?,
        first_seen: r.get(7)?,
        last_seen: r.get(8)?,
    })
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DeviceRow {
    pub imei: String,
    pub format: Option<String>,
    pub status: String,
    pub current_state: Option<String>,
    pub state_start_time: Option<String>,
    pub last_alarm: Option<String>,
    pub message_count: i64,
    pub first_seen: String,
    pub last_seen: String,
}

#[derive(Debug, Serialize)]
pub struct PositionRow {
    pub imei: String,
    pub format: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: Option<f64>,
    pub direction: Option<f64>,
    pub altitude: Option<f64>,
    pub gps_status: Option<String>,
    pub fuel_tank1: Option<f64>,
    pub fuel_tank2: Option<f64>,
    pub alarm: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub imei: String,
    pub event_type: String,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct DbStats {
    pub devices: i64,
    pub positions: i64,
    pub events: i64,
    pub raw_logs: i64,
    pub undecoded: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
