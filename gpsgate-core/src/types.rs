//! Shared types, error enum, and decoded event types for gpsgate-core.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

/// All errors produced by gpsgate-core.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing or non-numeric IMEI")]
    MissingImei,
    #[error("too few fields: expected at least {expected}, got {actual}")]
    TooFewFields { expected: usize, actual: usize },
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("missing marker: {0}")]
    MissingMarker(&'static str),
    #[error("frame exceeds {0} bytes")]
    FrameTooLong(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Normalized timestamp layout shared by every decoded event.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a datetime in the normalized `YYYY-MM-DD HH:MM:SS` form.
pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a normalized timestamp back into a datetime.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Longest run of ASCII digits at the start of `s`.
pub fn leading_digits(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(s.len());
    &s[..end]
}

/// True when `s` is non-empty and made only of ASCII digits.
pub fn is_digit_run(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse an optional numeric field: empty text is `0.0`, anything else must
/// be a finite float.
pub(crate) fn parse_number(field: &'static str, value: &str) -> Result<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(GatewayError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Wire formats and alarms
// ---------------------------------------------------------------------------

/// Wire dialect that produced a location update.
///
/// The dialects disagree on which status letter means "fix valid", so the
/// tag travels with every location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Standard,
    Hq,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Standard => "standard",
            WireFormat::Hq => "hq",
        }
    }

    /// Whether `status` denotes a valid GPS fix in this dialect.
    pub fn is_fix_valid(&self, status: &str) -> bool {
        match self {
            WireFormat::Standard => status == "F" || status == "A",
            WireFormat::Hq => status == "A",
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alarm carried in the trigger keyword of a standard frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alarm {
    Sos,
    LowBattery,
    Movement,
    Overspeed,
    Geofence,
    AccAlarm,
}

impl Alarm {
    /// Map a standard-format trigger keyword to an alarm. `tracker` and
    /// unknown keywords are plain position reports.
    pub fn from_keyword(keyword: &str) -> Option<Alarm> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "help me" => Some(Alarm::Sos),
            "low battery" => Some(Alarm::LowBattery),
            "move" => Some(Alarm::Movement),
            "speed" => Some(Alarm::Overspeed),
            "stockade" => Some(Alarm::Geofence),
            "accalarm" => Some(Alarm::AccAlarm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alarm::Sos => "sos",
            Alarm::LowBattery => "low_battery",
            Alarm::Movement => "movement",
            Alarm::Overspeed => "overspeed",
            Alarm::Geofence => "geofence",
            Alarm::AccAlarm => "acc_alarm",
        }
    }
}

impl std::fmt::Display for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decoded event types
// ---------------------------------------------------------------------------

/// Position report from the standard or HQ dialect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationUpdate {
    pub format: WireFormat,
    pub imei: String,
    pub timestamp: String,
    pub gps_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_tank1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_tank2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<Alarm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door_open: Option<bool>,
    /// HQ trailing status word, kept as received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_hex: Option<String>,
    pub raw_data: String,
}

impl LocationUpdate {
    /// Empty update for `imei`; decoders fill in what the frame carries.
    pub(crate) fn new(format: WireFormat, imei: String, timestamp: String, raw: &str) -> Self {
        LocationUpdate {
            format,
            imei,
            timestamp,
            gps_status: "V".into(),
            latitude: None,
            longitude: None,
            speed: None,
            direction: None,
            altitude: None,
            sim_number: None,
            fuel_tank1: None,
            fuel_tank2: None,
            alarm: None,
            acc_on: None,
            door_open: None,
            status_hex: None,
            raw_data: raw.to_string(),
        }
    }

    /// Both coordinates, when the frame produced them.
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Whether the raw status letter means a valid fix in this dialect.
    pub fn has_fix(&self) -> bool {
        self.format.is_fix_valid(&self.gps_status)
    }

    /// Device-reported time of the fix.
    pub fn recorded_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Bare-IMEI keep-alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatSimple {
    pub imei: String,
}

/// `##,imei:...` command heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatCommand {
    pub imei: String,
    pub status: Option<String>,
    pub raw_data: String,
}

/// Union type for all decoded events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodedEvent {
    LocationUpdate(LocationUpdate),
    HeartbeatSimple(HeartbeatSimple),
    HeartbeatCommand(HeartbeatCommand),
}

impl DecodedEvent {
    /// Get the IMEI from any event type.
    pub fn imei(&self) -> &str {
        match self {
            DecodedEvent::LocationUpdate(m) => &m.imei,
            DecodedEvent::HeartbeatSimple(m) => &m.imei,
            DecodedEvent::HeartbeatCommand(m) => &m.imei,
        }
    }

    /// Event type name as it appears in serialized output.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedEvent::LocationUpdate(_) => "location_update",
            DecodedEvent::HeartbeatSimple(_) => "heartbeat_simple",
            DecodedEvent::HeartbeatCommand(_) => "heartbeat_command",
        }
    }

    /// Original trimmed message, when the event keeps it.
    pub fn raw_data(&self) -> Option<&str> {
        match self {
            DecodedEvent::LocationUpdate(m) => Some(&m.raw_data),
            DecodedEvent::HeartbeatSimple(_) => None,
            DecodedEvent::HeartbeatCommand(m) => Some(&m.raw_data),
        }
    }

    pub fn as_location(&self) -> Option<&LocationUpdate> {
        match self {
            DecodedEvent::LocationUpdate(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        !matches!(self, DecodedEvent::LocationUpdate(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
