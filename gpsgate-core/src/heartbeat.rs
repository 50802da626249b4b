//! Heartbeat decoders: location-less keep-alives.
//!
//! - Simple:  `<15 digits>` or `<15 digits>;`
//! - Command: `##,imei:<digits>,<status>[;]`

use crate::types::*;

/// Digits in a bare-IMEI heartbeat.
pub const IMEI_LEN: usize = 15;

const IMEI_MARKER: &str = "imei:";

/// True when `message` is exactly 15 ASCII digits with an optional single `;`.
pub fn is_simple_heartbeat(message: &str) -> bool {
    let digits = message.strip_suffix(';').unwrap_or(message);
    digits.len() == IMEI_LEN && is_digit_run(digits)
}

/// Build the simple heartbeat for a message that passed [`is_simple_heartbeat`].
pub fn decode_simple(message: &str) -> HeartbeatSimple {
    HeartbeatSimple {
        imei: message.trim_end_matches(';').to_string(),
    }
}

/// Decode a trimmed `##,imei:...` command heartbeat.
pub fn decode_command(message: &str) -> Result<HeartbeatCommand> {
    let parts: Vec<&str> = message.split(',').collect();

    let imei = parts
        .get(1)
        .and_then(|p| p.strip_prefix(IMEI_MARKER))
        .ok_or(GatewayError::MissingMarker(IMEI_MARKER))?;
    let imei = imei.trim_end_matches(';');
    if !is_digit_run(imei) {
        return Err(GatewayError::MissingImei);
    }

    let status = parts
        .get(2)
        .map(|s| s.strip_suffix(';').unwrap_or(s).to_string());

    Ok(HeartbeatCommand {
        imei: imei.to_string(),
        status,
        raw_data: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_shape() {
        assert!(is_simple_heartbeat("123456789012345"));
        assert!(is_simple_heartbeat("123456789012345;"));
        assert!(!is_simple_heartbeat("123456789012345;;"));
        assert!(!is_simple_heartbeat("12345678901234;"));
        assert!(!is_simple_heartbeat("1234567890123456"));
        assert!(!is_simple_heartbeat("12345678901234a"));
    }

    #[test]
    fn test_decode_simple_strips_semicolon() {
        assert_eq!(decode_simple("123456789012345;").imei, "123456789012345");
    }

    #[test]
    fn test_decode_command() {
        let hb = decode_command("##,imei:359586018966098,A").unwrap();
        assert_eq!(hb.imei, "359586018966098");
        assert_eq!(hb.status.as_deref(), Some("A"));
        assert_eq!(hb.raw_data, "##,imei:359586018966098,A");
    }

    #[test]
    fn test_decode_command_trailing_semicolon() {
        let hb = decode_command("##,imei:359586018966098,A;").unwrap();
        assert_eq!(hb.status.as_deref(), Some("A"));
    }

    #[test]
    fn test_decode_command_without_status() {
        let hb = decode_command("##,imei:359586018966098;").unwrap();
        assert_eq!(hb.imei, "359586018966098");
        assert_eq!(hb.status, None);
    }

    #[test]
    fn test_decode_command_missing_inner_marker() {
        assert!(matches!(
            decode_command("##,359586018966098,A"),
            Err(GatewayError::MissingMarker(_))
        ));
        assert!(decode_command("##").is_err());
    }

    #[test]
    fn test_decode_command_empty_imei() {
        assert!(matches!(
            decode_command("##,imei:,A"),
            Err(GatewayError::MissingImei)
        ));
    }
}
