//! Standard-format decoder: `imei:<digits>,<trigger>,<YYMMDDHHMM[SS]>,...;`
//!
//! Field layout (0-based, after splitting on `,`):
//!
//! | idx | content                 | idx | content              |
//! |-----|-------------------------|-----|----------------------|
//! | 0   | `imei:<digits>`         | 9   | longitude DDDMM.MMMM |
//! | 1   | trigger keyword         | 10  | `E` / `W`            |
//! | 2   | date+time YYMMDDHHMM[SS]| 11  | speed                |
//! | 3   | SIM number              | 12  | heading              |
//! | 4   | status `F`/`A`/`V`      | 13  | altitude             |
//! | 5   | GPS time HHMMSS         | 16  | fuel tank 1 `NN%`    |
//! | 6   | `A` / `V`               | 17  | fuel tank 2 `NN%`    |
//! | 7-8 | latitude + `N` / `S`    |     |                      |

use chrono::NaiveDateTime;

use crate::coord;
use crate::types::*;

/// A location fix cannot exist with fewer fields than this.
pub const MIN_FIELDS: usize = 12;

const IMEI_MARKER: &str = "imei:";

/// Decode a trimmed standard-format message.
///
/// `fallback` is used as the timestamp when the frame's own date field is
/// absent or malformed.
pub fn decode_standard(message: &str, fallback: NaiveDateTime) -> Result<LocationUpdate> {
    let body = message.strip_suffix(';').unwrap_or(message);
    let parts: Vec<&str> = body.split(',').collect();

    let imei = parts[0]
        .strip_prefix(IMEI_MARKER)
        .map(leading_digits)
        .filter(|d| !d.is_empty())
        .ok_or(GatewayError::MissingImei)?;

    if parts.len() < MIN_FIELDS {
        return Err(GatewayError::TooFewFields {
            expected: MIN_FIELDS,
            actual: parts.len(),
        });
    }

    let timestamp = parse_datetime_field(parts[2]).unwrap_or_else(|| format_timestamp(&fallback));

    let mut update = LocationUpdate::new(WireFormat::Standard, imei.to_string(), timestamp, message);
    update.alarm = Alarm::from_keyword(parts[1]);
    update.sim_number = Some(parts[3].trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    update.gps_status = parts[4].to_string();

    update.latitude = coord::latitude(parts[7], parts[8]);
    update.longitude = coord::longitude(parts[9], parts[10]);

    update.speed = Some(parse_number("speed", parts[11])?);
    update.direction = optional_number(&parts, 12, "direction")?;
    update.altitude = optional_number(&parts, 13, "altitude")?;

    update.fuel_tank1 = percentage(&parts, 16, "fuel_tank1")?;
    update.fuel_tank2 = percentage(&parts, 17, "fuel_tank2")?;

    if message.contains("State:ACC=1") || message.contains("acc on") {
        update.acc_on = Some(true);
    }
    if message.contains("Door=1") {
        update.door_open = Some(true);
    }

    Ok(update)
}

/// `YYMMDDHHMM[SS]` → `20YY-MM-DD HH:MM:SS`. Seconds default to `00`.
fn parse_datetime_field(field: &str) -> Option<String> {
    let digits = leading_digits(field.trim());
    if digits.len() < 10 {
        return None;
    }

    let pair = |i: usize| &digits[i..i + 2];
    let seconds = if digits.len() >= 12 { pair(10) } else { "00" };

    let text = format!(
        "20{}-{}-{} {}:{}:{}",
        pair(0),
        pair(2),
        pair(4),
        pair(6),
        pair(8),
        seconds
    );
    // Reject calendar nonsense such as month 13 rather than emitting it.
    parse_timestamp(&text).map(|_| text)
}

fn optional_number(parts: &[&str], idx: usize, field: &'static str) -> Result<Option<f64>> {
    parts
        .get(idx)
        .map(|v| parse_number(field, v))
        .transpose()
}

/// Percent-suffixed reading; fields without `%` are not fuel levels.
/// A bare `%` carries no number and is malformed.
fn percentage(parts: &[&str], idx: usize, field: &'static str) -> Result<Option<f64>> {
    match parts.get(idx) {
        Some(v) if v.contains('%') => {
            let stripped = v.trim().trim_matches('%').trim();
            if stripped.is_empty() {
                return Err(GatewayError::InvalidNumber {
                    field,
                    value: v.to_string(),
                });
            }
            parse_number(field, stripped).map(Some)
        }
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0.00,0,10.0,0,0,80%,80%,25;";

    fn fallback() -> NaiveDateTime {
        parse_timestamp("2026-01-02 03:04:05").unwrap()
    }

    #[test]
    fn test_decode_sample() {
        let m = decode_standard(SAMPLE, fallback()).unwrap();
        assert_eq!(m.format, WireFormat::Standard);
        assert_eq!(m.imei, "1234567");
        assert_eq!(m.gps_status, "F");
        assert_eq!(m.timestamp, "2023-05-20 12:00:00");
        assert!((m.latitude.unwrap() - 31.409463).abs() < 1e-5);
        assert!((m.longitude.unwrap() - 121.409463).abs() < 1e-5);
        assert_eq!(m.speed, Some(0.0));
        assert_eq!(m.direction, Some(0.0));
        assert_eq!(m.altitude, Some(10.0));
        assert_eq!(m.fuel_tank1, Some(80.0));
        assert_eq!(m.fuel_tank2, Some(80.0));
        assert_eq!(m.sim_number, None);
        assert_eq!(m.alarm, None);
        assert_eq!(m.raw_data, SAMPLE);
        assert!(m.has_fix());
    }

    #[test]
    fn test_ten_digit_date_defaults_seconds() {
        let msg = "imei:1234567,tracker,2305201200,,F,120000,A,3124.5678,N,12124.5678,E,5.5";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.timestamp, "2023-05-20 12:00:00");
        assert_eq!(m.speed, Some(5.5));
        assert_eq!(m.direction, None);
        assert_eq!(m.altitude, None);
    }

    #[test]
    fn test_short_date_falls_back_to_clock() {
        let msg = "imei:1234567,tracker,2305,,F,120000,A,3124.5678,N,12124.5678,E,0.00;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.timestamp, "2026-01-02 03:04:05");
    }

    #[test]
    fn test_invalid_calendar_date_falls_back_to_clock() {
        let msg = "imei:1234567,tracker,231340120000,,F,120000,A,3124.5678,N,12124.5678,E,0.00;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.timestamp, "2026-01-02 03:04:05");
    }

    #[test]
    fn test_too_few_fields() {
        let err = decode_standard("imei:1234567,tracker", fallback()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::TooFewFields {
                expected: 12,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_missing_imei_digits() {
        let msg = "imei:abc,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0.00;";
        assert!(matches!(
            decode_standard(msg, fallback()),
            Err(GatewayError::MissingImei)
        ));
    }

    #[test]
    fn test_bad_coordinate_is_field_local() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,31x4.5678,N,12124.5678,E,0.00;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.latitude, None);
        assert!(m.longitude.is_some());
        assert_eq!(m.position(), None);
    }

    #[test]
    fn test_out_of_range_latitude_is_none() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,9500.0000,N,12124.5678,E,0.00;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.latitude, None);
    }

    #[test]
    fn test_malformed_speed_fails_message() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,fast;";
        assert!(matches!(
            decode_standard(msg, fallback()),
            Err(GatewayError::InvalidNumber { field: "speed", .. })
        ));
    }

    #[test]
    fn test_fuel_without_percent_is_ignored() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0,0,0,0,0,55,42%;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.fuel_tank1, None);
        assert_eq!(m.fuel_tank2, Some(42.0));
    }

    #[test]
    fn test_malformed_fuel_fails_message() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0,0,0,0,0,lots%;";
        assert!(decode_standard(msg, fallback()).is_err());
    }

    #[test]
    fn test_bare_percent_fuel_fails_message() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0,0,0,0,0,%,80%;";
        assert!(matches!(
            decode_standard(msg, fallback()),
            Err(GatewayError::InvalidNumber { field: "fuel_tank1", .. })
        ));
    }

    #[test]
    fn test_empty_speed_direction_altitude_default_to_zero() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,,,,0,0;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.speed, Some(0.0));
        assert_eq!(m.direction, Some(0.0));
        assert_eq!(m.altitude, Some(0.0));
    }

    #[test]
    fn test_alarm_and_sim_number() {
        let msg = "imei:359586018966098,help me,230520120000,13800138000,A,120000,A,3124.5678,S,00433.9876,W,12.0;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.alarm, Some(Alarm::Sos));
        assert_eq!(m.sim_number.as_deref(), Some("13800138000"));
        assert!(m.latitude.unwrap() < 0.0);
        assert!(m.longitude.unwrap() < 0.0);
    }

    #[test]
    fn test_acc_and_door_markers() {
        let msg = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0,0,0,State:ACC=1 Door=1;";
        let m = decode_standard(msg, fallback()).unwrap();
        assert_eq!(m.acc_on, Some(true));
        assert_eq!(m.door_open, Some(true));

        let m = decode_standard(SAMPLE, fallback()).unwrap();
        assert_eq!(m.acc_on, None);
        assert_eq!(m.door_open, None);
    }
}
