//! Per-device state machine over decoded events.
//!
//! Pure logic: no I/O, no database. Produces `TrackEvent` outputs that
//! the caller (listener/CLI) writes to a database.
//!
//! Tracks per-device: last fix, motion state and how long it has held,
//! last alarm, and liveness.
//!
//! Two clocks are involved. Liveness (`first_seen`, `last_seen`, staleness)
//! runs on the receive clock supplied by the caller. Fix-related outputs
//! (positions, state changes, alarms) carry the device's own timestamp,
//! which may sit in another time zone or drift.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::types::*;

/// Devices considered offline after this many seconds of silence.
pub const STALE_TIMEOUT_SECS: i64 = 600;

/// Speed (km/h) above which a device counts as moving.
pub const MOVING_SPEED_KMH: f64 = 5.0;

// ---------------------------------------------------------------------------
// Motion state
// ---------------------------------------------------------------------------

/// What the vehicle is doing, derived from speed and ignition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Moving,
    Idling,
    Parked,
}

impl MotionState {
    /// Speed over the threshold is moving whatever the ignition reports;
    /// otherwise ignition on is idling and anything else is parked.
    pub fn classify(speed: Option<f64>, acc_on: Option<bool>, moving_speed: f64) -> Self {
        if speed.unwrap_or(0.0) > moving_speed {
            MotionState::Moving
        } else if acc_on == Some(true) {
            MotionState::Idling
        } else {
            MotionState::Parked
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Moving => "moving",
            MotionState::Idling => "idling",
            MotionState::Parked => "parked",
        }
    }
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Track events (output)
// ---------------------------------------------------------------------------

/// Events emitted by the tracker for the caller to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// First time seeing this IMEI. Stamped with the receive time.
    NewDevice { imei: String, timestamp: NaiveDateTime },
    /// Device is alive (any decoded event). Stamped with the receive time.
    DeviceSeen {
        imei: String,
        heartbeat: bool,
        timestamp: NaiveDateTime,
    },
    /// New position to store.
    PositionUpdate {
        imei: String,
        format: WireFormat,
        lat: f64,
        lon: f64,
        speed: Option<f64>,
        direction: Option<f64>,
        altitude: Option<f64>,
        gps_status: String,
        fuel_tank1: Option<f64>,
        fuel_tank2: Option<f64>,
        alarm: Option<Alarm>,
        timestamp: NaiveDateTime,
    },
    /// Motion state changed.
    StateChange {
        imei: String,
        from: Option<MotionState>,
        to: MotionState,
        timestamp: NaiveDateTime,
    },
    /// Device raised an alarm.
    Alarm {
        imei: String,
        alarm: Alarm,
        lat: Option<f64>,
        lon: Option<f64>,
        timestamp: NaiveDateTime,
    },
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

/// Mutable state for a single tracked device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub imei: String,
    pub format: Option<WireFormat>,

    // Last fix
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub direction: Option<f64>,
    pub gps_status: Option<String>,

    // Motion
    pub motion: Option<MotionState>,
    pub state_since: Option<NaiveDateTime>,
    pub last_alarm: Option<Alarm>,

    // Metadata
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub message_count: u64,
    pub heartbeat_count: u64,
}

impl DeviceState {
    pub fn new(imei: &str, timestamp: NaiveDateTime) -> Self {
        DeviceState {
            imei: imei.to_string(),
            format: None,
            lat: None,
            lon: None,
            speed: None,
            direction: None,
            gps_status: None,
            motion: None,
            state_since: None,
            last_alarm: None,
            first_seen: timestamp,
            last_seen: timestamp,
            message_count: 0,
            heartbeat_count: 0,
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    pub fn age(&self, now: NaiveDateTime) -> Duration {
        now - self.last_seen
    }

    pub fn is_stale(&self, now: NaiveDateTime, timeout_secs: i64) -> bool {
        self.age(now) > Duration::seconds(timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Track multiple devices from decoded events.
///
/// Pure state machine: call `update()` with events, get back `TrackEvent`
/// outputs. The caller decides what to do with them.
pub struct Tracker {
    pub devices: HashMap<String, DeviceState>,
    pub stale_timeout_secs: i64,
    pub moving_speed_kmh: f64,

    // Counters
    pub total_events: u64,
    pub position_updates: u64,
    pub heartbeats: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker::new(STALE_TIMEOUT_SECS, MOVING_SPEED_KMH)
    }
}

impl Tracker {
    pub fn new(stale_timeout_secs: i64, moving_speed_kmh: f64) -> Self {
        Tracker {
            devices: HashMap::new(),
            stale_timeout_secs,
            moving_speed_kmh,
            total_events: 0,
            position_updates: 0,
            heartbeats: 0,
        }
    }

    /// Process one decoded event received at `received_at`.
    ///
    /// `received_at` drives liveness and must come from the same clock
    /// later passed to [`Tracker::get_active`] and [`Tracker::prune_stale`].
    /// Fix outputs use the device's own timestamp when it has one.
    pub fn update(&mut self, event: &DecodedEvent, received_at: NaiveDateTime) -> Vec<TrackEvent> {
        self.total_events += 1;
        let mut events = Vec::new();

        let imei = event.imei().to_string();
        let timestamp = event
            .as_location()
            .and_then(LocationUpdate::recorded_at)
            .unwrap_or(received_at);

        let dev = self.devices.entry(imei.clone()).or_insert_with(|| {
            events.push(TrackEvent::NewDevice {
                imei: imei.clone(),
                timestamp: received_at,
            });
            DeviceState::new(&imei, received_at)
        });
        dev.message_count += 1;
        if received_at > dev.last_seen {
            dev.last_seen = received_at;
        }

        events.push(TrackEvent::DeviceSeen {
            imei: imei.clone(),
            heartbeat: event.is_heartbeat(),
            timestamp: received_at,
        });

        let loc = match event {
            DecodedEvent::LocationUpdate(loc) => loc,
            _ => {
                dev.heartbeat_count += 1;
                self.heartbeats += 1;
                return events;
            }
        };

        dev.format = Some(loc.format);
        dev.gps_status = Some(loc.gps_status.clone());

        if let Some((lat, lon)) = loc.position() {
            dev.lat = Some(lat);
            dev.lon = Some(lon);
            dev.speed = loc.speed;
            dev.direction = loc.direction;
            self.position_updates += 1;

            events.push(TrackEvent::PositionUpdate {
                imei: imei.clone(),
                format: loc.format,
                lat,
                lon,
                speed: loc.speed,
                direction: loc.direction,
                altitude: loc.altitude,
                gps_status: loc.gps_status.clone(),
                fuel_tank1: loc.fuel_tank1,
                fuel_tank2: loc.fuel_tank2,
                alarm: loc.alarm,
                timestamp,
            });

            let motion = MotionState::classify(loc.speed, loc.acc_on, self.moving_speed_kmh);
            if dev.motion != Some(motion) {
                events.push(TrackEvent::StateChange {
                    imei: imei.clone(),
                    from: dev.motion,
                    to: motion,
                    timestamp,
                });
                dev.motion = Some(motion);
                dev.state_since = Some(timestamp);
            }
        }

        if let Some(alarm) = loc.alarm {
            dev.last_alarm = Some(alarm);
            events.push(TrackEvent::Alarm {
                imei,
                alarm,
                lat: loc.latitude,
                lon: loc.longitude,
                timestamp,
            });
        }

        events
    }

    /// Return all non-stale devices, most recently seen first.
    pub fn get_active(&self, now: NaiveDateTime) -> Vec<&DeviceState> {
        let mut active: Vec<_> = self
            .devices
            .values()
            .filter(|d| !d.is_stale(now, self.stale_timeout_secs))
            .collect();
        active.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        active
    }

    /// Remove stale devices from tracking. Returns count removed.
    pub fn prune_stale(&mut self, now: NaiveDateTime) -> usize {
        let timeout = self.stale_timeout_secs;
        let before = self.devices.len();
        self.devices.retain(|_, d| !d.is_stale(now, timeout));
        before - self.devices.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
