//! gpsgate-core: Pure decode + tracking library for GPS vehicle trackers.
//!
//! No async, no I/O, just algorithms. This crate is the shared core used by
//! both `gpsgate-server` (listener + CLI) and `gpsgate-sim` (traffic generator).

pub mod config;
pub mod coord;
pub mod decode;
pub mod encode;
pub mod frame;
pub mod heartbeat;
pub mod hq;
pub mod standard;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use decode::{classify, decode, decode_at, decode_bytes, Shape};
pub use tracker::{DeviceState, MotionState, TrackEvent, Tracker};
pub use types::*;
