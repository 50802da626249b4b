//! Simulated vehicle: a looping route through Casablanca and a 100-tick
//! scenario cycle of driving, idling, parking, and an SOS.

use chrono::NaiveDateTime;

use gpsgate_core::encode::{self, Fix};

/// Gare Routière to Casa Port.
pub const WAYPOINTS: [(f64, f64); 7] = [
    (33.5685, -7.5857),
    (33.5702, -7.5878),
    (33.5731, -7.5896),
    (33.5780, -7.5950),
    (33.5825, -7.6020),
    (33.5880, -7.6080),
    (33.5935, -7.6115),
];

/// Fraction of a route leg covered per driving tick.
pub const STEP: f64 = 0.10;

/// Driving speed in km/h.
pub const CRUISE_KMH: f64 = 40.0;

/// Ticks in one scenario cycle.
pub const CYCLE_LEN: u32 = 100;

/// Linear interpolation between two points, `t` in `0.0..=1.0`.
pub fn interpolate(p1: (f64, f64), p2: (f64, f64), t: f64) -> (f64, f64) {
    (p1.0 + (p2.0 - p1.0) * t, p1.1 + (p2.1 - p1.1) * t)
}

/// Initial great-circle bearing from `p1` to `p2`, degrees clockwise from north.
pub fn bearing(p1: (f64, f64), p2: (f64, f64)) -> f64 {
    let (lat1, lat2) = (p1.0.to_radians(), p2.0.to_radians());
    let d_lon = (p2.1 - p1.1).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Driving,
    Idling,
    Parked,
    Sos,
}

impl Phase {
    /// Phase for a tick within the cycle.
    pub fn at(tick: u32) -> Phase {
        match tick % CYCLE_LEN {
            40..=44 => Phase::Idling,
            45..=49 => Phase::Parked,
            50..=51 => Phase::Sos,
            _ => Phase::Driving,
        }
    }
}

/// Which dialect driving frames are sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dialect {
    Hq,
    Standard,
}

/// Vehicle walking the route. Call [`Vehicle::tick`] once per interval.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub imei: String,
    pub dialect: Dialect,
    leg: usize,
    progress: f64,
    cycle: u32,
}

impl Vehicle {
    pub fn new(imei: &str, dialect: Dialect) -> Self {
        Vehicle {
            imei: imei.to_string(),
            dialect,
            leg: 0,
            progress: 0.0,
            cycle: 0,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        interpolate(WAYPOINTS[self.leg], WAYPOINTS[self.leg + 1], self.progress)
    }

    pub fn course(&self) -> f64 {
        bearing(WAYPOINTS[self.leg], WAYPOINTS[self.leg + 1])
    }

    /// Produce the frame for this tick, then advance along the route if driving.
    pub fn tick(&mut self, time: NaiveDateTime) -> (Phase, String) {
        self.cycle = (self.cycle + 1) % CYCLE_LEN;
        let phase = Phase::at(self.cycle);
        let (lat, lon) = self.position();

        let (speed, acc_on) = match phase {
            Phase::Driving => (CRUISE_KMH, true),
            Phase::Idling | Phase::Sos => (0.0, true),
            Phase::Parked => (0.0, false),
        };
        let fix = Fix {
            imei: self.imei.clone(),
            lat,
            lon,
            speed,
            course: self.course(),
            time,
            valid: true,
            acc_on,
            door_open: false,
        };

        let frame = match (phase, self.dialect) {
            (Phase::Sos, _) => encode::standard_frame(&fix, "help me"),
            (_, Dialect::Hq) => encode::hq_frame(&fix),
            (_, Dialect::Standard) => encode::standard_frame(&fix, "tracker"),
        };

        if phase == Phase::Driving {
            self.advance();
        }
        (phase, frame)
    }

    fn advance(&mut self) {
        self.progress += STEP;
        if self.progress >= 1.0 - 1e-9 {
            self.progress = 0.0;
            self.leg = (self.leg + 1) % (WAYPOINTS.len() - 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gpsgate_core::{decode_at, parse_timestamp, Alarm, DecodedEvent, MotionState};

    const IMEI: &str = "359586018966098";

    fn t0() -> NaiveDateTime {
        parse_timestamp("2024-02-01 08:15:00").unwrap()
    }

    #[test]
    fn test_interpolate_endpoints() {
        let p1 = WAYPOINTS[0];
        let p2 = WAYPOINTS[1];
        assert_eq!(interpolate(p1, p2, 0.0), p1);
        let (lat, lon) = interpolate(p1, p2, 0.5);
        assert!((lat - 33.56935).abs() < 1e-9);
        assert!((lon + 7.58675).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_cardinal() {
        assert!((bearing((0.0, 0.0), (1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing((0.0, 0.0), (0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing((1.0, 0.0), (0.0, 0.0)) - 180.0).abs() < 1e-9);
        // The route heads north-west out of the bus station
        let b = bearing(WAYPOINTS[0], WAYPOINTS[1]);
        assert!(b > 270.0 && b < 360.0, "bearing {b}");
    }

    #[test]
    fn test_phase_cycle() {
        assert_eq!(Phase::at(1), Phase::Driving);
        assert_eq!(Phase::at(39), Phase::Driving);
        assert_eq!(Phase::at(40), Phase::Idling);
        assert_eq!(Phase::at(45), Phase::Parked);
        assert_eq!(Phase::at(50), Phase::Sos);
        assert_eq!(Phase::at(51), Phase::Sos);
        assert_eq!(Phase::at(52), Phase::Driving);
        assert_eq!(Phase::at(140), Phase::Idling);
    }

    #[test]
    fn test_route_wraps_around() {
        let mut v = Vehicle::new(IMEI, Dialect::Hq);
        let legs = WAYPOINTS.len() - 1;
        for _ in 0..(legs * 10) {
            v.advance();
        }
        assert_eq!(v.leg, 0);
        assert_eq!(v.position(), WAYPOINTS[0]);
    }

    #[test]
    fn test_driving_tick_decodes_as_moving_hq() {
        let mut v = Vehicle::new(IMEI, Dialect::Hq);
        let (phase, frame) = v.tick(t0());
        assert_eq!(phase, Phase::Driving);
        assert!(frame.starts_with("*HQ,359586018966098,V1,081500,A,"));

        let event = decode_at(&frame, t0()).expect("simulated frame decodes");
        let loc = event.as_location().unwrap();
        assert!((loc.latitude.unwrap() - WAYPOINTS[0].0).abs() < 1e-4);
        assert!((loc.longitude.unwrap() - WAYPOINTS[0].1).abs() < 1e-4);
        assert_eq!(loc.speed, Some(CRUISE_KMH));
        assert_eq!(loc.status_hex.as_deref(), Some("00000001"));
        assert_eq!(loc.recorded_at(), Some(t0()));

        // Progress moved along the first leg
        assert!(v.position() != WAYPOINTS[0]);
    }

    #[test]
    fn test_standard_dialect_reports_acc() {
        let mut v = Vehicle::new(IMEI, Dialect::Standard);
        let (_, frame) = v.tick(t0());
        let event = decode_at(&frame, t0()).unwrap();
        let loc = event.as_location().unwrap();
        assert_eq!(loc.acc_on, Some(true));
        assert_eq!(
            MotionState::classify(loc.speed, loc.acc_on, 5.0),
            MotionState::Moving
        );
    }

    #[test]
    fn test_full_cycle_phases_and_sos() {
        let mut v = Vehicle::new(IMEI, Dialect::Hq);
        let mut sos_frames = 0;
        let mut driving_frames = 0;
        let mut parked_at = None;
        for _ in 0..CYCLE_LEN {
            let (phase, frame) = v.tick(t0());
            let event = decode_at(&frame, t0()).expect("every simulated frame decodes");
            let DecodedEvent::LocationUpdate(loc) = event else {
                panic!("expected location update");
            };
            match phase {
                Phase::Sos => {
                    sos_frames += 1;
                    assert_eq!(loc.alarm, Some(Alarm::Sos));
                }
                Phase::Parked => {
                    let pos = v.position();
                    // Vehicle holds still while parked
                    assert_eq!(*parked_at.get_or_insert(pos), pos);
                    assert_eq!(loc.speed, Some(0.0));
                    assert_eq!(loc.status_hex.as_deref(), Some("00000000"));
                }
                Phase::Idling => assert_eq!(loc.status_hex.as_deref(), Some("00000001")),
                Phase::Driving => driving_frames += 1,
            }
        }
        assert_eq!(sos_frames, 2);
        assert_eq!(driving_frames, 88);
    }
}
