//! HQ-format decoder: `*HQ,<imei>,<proto>,<HHMMSS>,<A|V>,<lat>,<N|S>,<lon>,<E|W>,<speed>,<course>,<DDMMYY>,<status-hex>...#`
//!
//! Compact vendor dialect. Status `A` is the only "fix valid" letter here,
//! unlike the standard dialect's `F`/`A` pair. Fields after the date are an
//! opaque status payload.

use crate::coord;
use crate::types::*;

/// Minimum comma-separated fields for an HQ frame.
pub const MIN_FIELDS: usize = 10;

/// Decode a trimmed HQ message.
pub fn decode_hq(message: &str) -> Result<LocationUpdate> {
    let body = message.strip_suffix('#').unwrap_or(message);
    let parts: Vec<&str> = body.split(',').collect();

    if parts.len() < MIN_FIELDS {
        return Err(GatewayError::TooFewFields {
            expected: MIN_FIELDS,
            actual: parts.len(),
        });
    }

    let imei = parts[1].trim();
    if imei.is_empty() {
        return Err(GatewayError::MissingImei);
    }

    let date = parts
        .get(11)
        .ok_or_else(|| GatewayError::InvalidTimestamp("missing date field".into()))?;
    let timestamp = build_timestamp(date, parts[3])?;

    let mut update = LocationUpdate::new(WireFormat::Hq, imei.to_string(), timestamp, message);
    update.gps_status = parts[4].to_string();
    update.latitude = coord::latitude(parts[5], parts[6]);
    update.longitude = coord::longitude(parts[7], parts[8]);
    update.speed = Some(parse_number("speed", parts[9])?);
    update.direction = parts
        .get(10)
        .and_then(|c| parse_number("course", c).ok());
    update.status_hex = parts
        .get(12)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(update)
}

/// `DDMMYY` + `HHMMSS` → `20YY-MM-DD HH:MM:SS`.
fn build_timestamp(date: &str, time: &str) -> Result<String> {
    let date = date.trim();
    let time = time.trim();
    if leading_digits(date).len() < 6 || leading_digits(time).len() < 6 {
        return Err(GatewayError::InvalidTimestamp(format!("{date} {time}")));
    }

    let text = format!(
        "20{}-{}-{} {}:{}:{}",
        &date[4..6],
        &date[2..4],
        &date[0..2],
        &time[0..2],
        &time[2..4],
        &time[4..6]
    );
    match parse_timestamp(&text) {
        Some(_) => Ok(text),
        None => Err(GatewayError::InvalidTimestamp(text)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
