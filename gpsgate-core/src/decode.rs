//! Classify raw tracker messages and decode them into typed events.
//!
//! Four independently evolved dialects share one channel. Classification is
//! a flat, ordered list of shape checks; the first match wins:
//! 1. `imei:...`                      → standard location frame
//! 2. 15 digits, optional `;`         → simple heartbeat
//! 3. `##,imei:...`                   → command heartbeat
//! 4. `*HQ,...`                       → HQ location frame
//!
//! Anything else yields `None` without logging. Every function here is pure
//! and safe to call from any number of tasks at once.

use chrono::{Local, NaiveDateTime};
use tracing::debug;

use crate::heartbeat;
use crate::hq;
use crate::standard;
use crate::types::*;

const STANDARD_PREFIX: &str = "imei:";
const COMMAND_PREFIX: &str = "##,imei:";
const HQ_PREFIX: &str = "*HQ,";

/// Syntactic shape of a trimmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Standard,
    SimpleHeartbeat,
    CommandHeartbeat,
    Hq,
}

/// Classify a message by prefix/shape. Returns `None` for unknown dialects.
pub fn classify(message: &str) -> Option<Shape> {
    let message = message.trim();
    if message.starts_with(STANDARD_PREFIX) {
        Some(Shape::Standard)
    } else if heartbeat::is_simple_heartbeat(message) {
        Some(Shape::SimpleHeartbeat)
    } else if message.starts_with(COMMAND_PREFIX) {
        Some(Shape::CommandHeartbeat)
    } else if message.starts_with(HQ_PREFIX) {
        Some(Shape::Hq)
    } else {
        None
    }
}

/// Decode one raw message, using the local wall clock as the fallback
/// timestamp for standard frames without a usable date.
pub fn decode(message: &str) -> Option<DecodedEvent> {
    decode_at(message, Local::now().naive_local())
}

/// Decode one raw message with an explicit fallback timestamp.
pub fn decode_at(message: &str, fallback: NaiveDateTime) -> Option<DecodedEvent> {
    let message = message.trim();
    if message.is_empty() {
        return None;
    }

    let shape = classify(message)?;
    let result = match shape {
        Shape::Standard => {
            standard::decode_standard(message, fallback).map(DecodedEvent::LocationUpdate)
        }
        Shape::SimpleHeartbeat => Ok(DecodedEvent::HeartbeatSimple(heartbeat::decode_simple(
            message,
        ))),
        Shape::CommandHeartbeat => {
            heartbeat::decode_command(message).map(DecodedEvent::HeartbeatCommand)
        }
        Shape::Hq => hq::decode_hq(message).map(DecodedEvent::LocationUpdate),
    };

    match result {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(?shape, error = %e, raw = message, "decode failed");
            None
        }
    }
}

/// Decode raw transport bytes. Non-UTF-8 input is not text and yields `None`.
pub fn decode_bytes(raw: &[u8]) -> Option<DecodedEvent> {
    std::str::from_utf8(raw).ok().and_then(decode)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD: &str = "imei:1234567,tracker,230520120000,,F,120000,A,3124.5678,N,12124.5678,E,0.00,0,10.0,0,0,80%,80%,25;";
    const HQ: &str =
        "*HQ,359586018966098,V1,123519,A,3123.1234,N,00433.9876,E,0.08,0,231023,0,0,0,0,0,0,0,0#";

    fn fixed_clock() -> NaiveDateTime {
        parse_timestamp("2026-10-18 09:30:00").unwrap()
    }

    #[test]
    fn test_rejects_empty_and_garbage() {
        assert!(decode("").is_none());
        assert!(decode("   \r\n").is_none());
        assert!(decode("garbage_data").is_none());
        assert!(decode_bytes(&[0xff, 0xfe, 0x31]).is_none());
    }

    #[test]
    fn test_standard_frame() {
        let ev = decode(STANDARD).unwrap();
        let m = ev.as_location().unwrap();
        assert_eq!(ev.kind(), "location_update");
        assert_eq!(m.format, WireFormat::Standard);
        assert_eq!(m.imei, "1234567");
        assert_eq!(m.gps_status, "F");
        assert!((m.latitude.unwrap() - 31.40946).abs() < 1e-4);
        assert!((m.longitude.unwrap() - 121.40946).abs() < 1e-4);
        assert_eq!(m.fuel_tank1, Some(80.0));
    }

    #[test]
    fn test_simple_heartbeat_with_and_without_semicolon() {
        for msg in ["123456789012345;", "123456789012345", "  123456789012345;\r\n"] {
            let ev = decode(msg).unwrap();
            assert_eq!(
                ev,
                DecodedEvent::HeartbeatSimple(HeartbeatSimple {
                    imei: "123456789012345".into()
                })
            );
        }
    }

    #[test]
    fn test_command_heartbeat() {
        match decode("##,imei:359586018966098,A").unwrap() {
            DecodedEvent::HeartbeatCommand(hb) => {
                assert_eq!(hb.imei, "359586018966098");
                assert_eq!(hb.status.as_deref(), Some("A"));
            }
            other => panic!("expected command heartbeat, got {other:?}"),
        }
    }

    #[test]
    fn test_hq_frame() {
        let ev = decode(HQ).unwrap();
        let m = ev.as_location().unwrap();
        assert_eq!(m.format, WireFormat::Hq);
        assert_eq!(m.imei, "359586018966098");
        assert_eq!(m.timestamp, "2023-10-23 12:35:19");
        assert!((m.speed.unwrap() - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_truncated_standard_is_none() {
        assert!(decode("imei:1234567,tracker").is_none());
    }

    #[test]
    fn test_structural_failures_are_none() {
        assert!(decode("##,359586018966098,A").is_none());
        assert!(decode("*HQ,359586018966098,V1#").is_none());
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(classify(STANDARD), Some(Shape::Standard));
        assert_eq!(classify("123456789012345"), Some(Shape::SimpleHeartbeat));
        assert_eq!(classify("##,imei:1,A"), Some(Shape::CommandHeartbeat));
        assert_eq!(classify(HQ), Some(Shape::Hq));
        assert_eq!(classify("(0359586018966098BP05)"), None);
        // Lowercase prefixes are other dialects.
        assert_eq!(classify("*hq,1,2"), None);
        assert_eq!(classify("IMEI:123"), None);
    }

    #[test]
    fn test_idempotent() {
        for msg in [STANDARD, HQ, "##,imei:359586018966098,A", "123456789012345"] {
            assert_eq!(decode(msg), decode(msg));
        }
    }

    #[test]
    fn test_fallback_clock_is_used_for_undated_standard() {
        let msg = "imei:1234567,tracker,,,F,120000,A,3124.5678,N,12124.5678,E,0.00;";
        let ev = decode_at(msg, fixed_clock()).unwrap();
        assert_eq!(ev.as_location().unwrap().timestamp, "2026-10-18 09:30:00");
        assert_eq!(decode_at(msg, fixed_clock()), decode_at(msg, fixed_clock()));
    }

    #[test]
    fn test_raw_data_is_trimmed_message() {
        let ev = decode(&format!("  {HQ}\r\n")).unwrap();
        assert_eq!(ev.raw_data(), Some(HQ));
    }

    #[test]
    fn test_json_shape() {
        let ev = decode(HQ).unwrap();
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "location_update");
        assert_eq!(json["format"], "hq");
        assert!(json.get("altitude").is_none());
    }

    #[test]
    fn test_decode_from_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| decode(HQ)))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), decode(HQ));
        }
    }
}
