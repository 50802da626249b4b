//! Coordinate normalization for tracker position fields.
//!
//! Trackers send positions as sexagesimal `DDMM.MMMM` (latitude) or
//! `DDDMM.MMMM` (longitude) text with a separate hemisphere letter:
//! - integer degrees = all digits before the last two integer digits
//! - minutes = the last two integer digits plus the fraction
//! - decimal = degrees + minutes / 60, negated for `S` / `W`

/// Largest valid latitude magnitude.
pub const MAX_LAT: f64 = 90.0;

/// Largest valid longitude magnitude.
pub const MAX_LON: f64 = 180.0;

/// Convert `DDMM.MMMM` text plus a hemisphere letter to signed decimal degrees.
///
/// `S`/`W` (any case) negate; every other letter leaves the value positive.
/// Returns `None` when either argument is empty or the value is not a finite
/// number.
pub fn to_decimal(value: &str, hemisphere: &str) -> Option<f64> {
    let value = value.trim();
    let hemisphere = hemisphere.trim();
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }

    let v: f64 = value.parse().ok().filter(|v: &f64| v.is_finite())?;

    let degrees = (v / 100.0).floor();
    let minutes = v - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    if hemisphere.eq_ignore_ascii_case("S") || hemisphere.eq_ignore_ascii_case("W") {
        Some(-decimal)
    } else {
        Some(decimal)
    }
}

/// Normalize a latitude field, rejecting anything outside [-90, 90].
pub fn latitude(value: &str, hemisphere: &str) -> Option<f64> {
    to_decimal(value, hemisphere).filter(|lat| lat.abs() <= MAX_LAT)
}

/// Normalize a longitude field, rejecting anything outside [-180, 180].
pub fn longitude(value: &str, hemisphere: &str) -> Option<f64> {
    to_decimal(value, hemisphere).filter(|lon| lon.abs() <= MAX_LON)
}

/// Encode signed decimal degrees as `DDMM.MMMM` / `DDDMM.MMMM` text and a
/// hemisphere letter. Inverse of [`to_decimal`] to four minute decimals.
pub fn to_ddmm(coord: f64, is_lat: bool) -> (String, char) {
    let abs = coord.abs();
    let mut degrees = abs.trunc() as u32;
    let mut minutes = (abs - degrees as f64) * 60.0;
    // 59.99996 would print as 60.0000
    if (minutes * 10_000.0).round() >= 600_000.0 {
        degrees += 1;
        minutes = 0.0;
    }

    if is_lat {
        let hemi = if coord >= 0.0 { 'N' } else { 'S' };
        (format!("{degrees:02}{minutes:07.4}"), hemi)
    } else {
        let hemi = if coord >= 0.0 { 'E' } else { 'W' };
        (format!("{degrees:03}{minutes:07.4}"), hemi)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_to_decimal_north() {
        let lat = to_decimal("3124.5678", "N").unwrap();
        assert!(close(lat, 31.409463), "got {lat}");
    }

    #[test]
    fn test_to_decimal_west() {
        let lon = to_decimal("00433.9876", "W").unwrap();
        assert!(close(lon, -4.566460), "got {lon}");
    }

    #[test]
    fn test_to_decimal_lowercase_hemisphere() {
        let lat = to_decimal("3124.5678", "s").unwrap();
        assert!(close(lat, -31.409463));
    }

    #[test]
    fn test_to_decimal_unknown_hemisphere_is_positive() {
        let lat = to_decimal("3124.5678", "X").unwrap();
        assert!(lat > 0.0);
    }

    #[test]
    fn test_to_decimal_empty() {
        assert_eq!(to_decimal("", "N"), None);
        assert_eq!(to_decimal("3124.5678", ""), None);
    }

    #[test]
    fn test_to_decimal_not_numeric() {
        assert_eq!(to_decimal("31x4.56", "N"), None);
        assert_eq!(to_decimal("inf", "N"), None);
    }

    #[test]
    fn test_range_checks() {
        assert!(latitude("9130.0000", "N").is_none());
        assert!(latitude("8959.0000", "S").is_some());
        assert!(longitude("18100.0000", "E").is_none());
        assert!(longitude("17959.9999", "W").is_some());
    }

    #[test]
    fn test_to_ddmm() {
        assert_eq!(to_ddmm(31.409463, true), ("3124.5678".to_string(), 'N'));
        assert_eq!(to_ddmm(-7.5898, false), ("00735.3880".to_string(), 'W'));
    }

    #[test]
    fn test_to_ddmm_minute_carry() {
        let (text, hemi) = to_ddmm(33.9999999, true);
        assert_eq!(text, "3400.0000");
        assert_eq!(hemi, 'N');
    }

    #[test]
    fn test_to_ddmm_inverts_to_decimal() {
        let (text, hemi) = to_ddmm(-33.5731, true);
        let back = latitude(&text, &hemi.to_string()).unwrap();
        assert!(close(back, -33.5731));
    }
}
