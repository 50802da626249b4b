//! Build wire frames in the dialects the decoder understands.
//!
//! Used by the traffic simulator and by tests that need realistic frames.

use chrono::NaiveDateTime;

use crate::coord::to_ddmm;

/// One simulated GPS fix.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub imei: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub course: f64,
    pub time: NaiveDateTime,
    pub valid: bool,
    pub acc_on: bool,
    pub door_open: bool,
}

impl Fix {
    /// HQ status word: bit 0 = ACC, bit 1 = door.
    pub fn status_word(&self) -> u32 {
        let mut status = 0u32;
        if self.acc_on {
            status |= 1;
        }
        if self.door_open {
            status |= 2;
        }
        status
    }
}

/// `*HQ,<imei>,V1,<HHMMSS>,<A|V>,<lat>,<N|S>,<lon>,<E|W>,<speed>,<course>,<DDMMYY>,<status>#`
pub fn hq_frame(fix: &Fix) -> String {
    let (lat, lat_dir) = to_ddmm(fix.lat, true);
    let (lon, lon_dir) = to_ddmm(fix.lon, false);
    format!(
        "*HQ,{},V1,{},{},{lat},{lat_dir},{lon},{lon_dir},{:.2},{:.2},{},{:08X}#",
        fix.imei,
        fix.time.format("%H%M%S"),
        if fix.valid { 'A' } else { 'V' },
        fix.speed,
        fix.course,
        fix.time.format("%d%m%y"),
        fix.status_word()
    )
}

/// `imei:<imei>,<trigger>,<YYMMDDHHMMSS>,,<F|V>,<HHMMSS>,<A|V>,<lat>,...,<speed>,<course>,<alt>,[State:ACC=1];`
pub fn standard_frame(fix: &Fix, trigger: &str) -> String {
    let (lat, lat_dir) = to_ddmm(fix.lat, true);
    let (lon, lon_dir) = to_ddmm(fix.lon, false);
    let mut frame = format!(
        "imei:{},{trigger},{},,{},{},{},{lat},{lat_dir},{lon},{lon_dir},{:.2},{:.2},0,",
        fix.imei,
        fix.time.format("%y%m%d%H%M%S"),
        if fix.valid { 'F' } else { 'V' },
        fix.time.format("%H%M%S"),
        if fix.valid { 'A' } else { 'V' },
        fix.speed,
        fix.course,
    );
    if fix.acc_on {
        frame.push_str("State:ACC=1");
    }
    frame.push(';');
    frame
}

/// `(0<imei>BP05)` login frame.
pub fn login_frame(imei: &str) -> String {
    format!("(0{imei}BP05)")
}

/// `<imei>;` keep-alive.
pub fn simple_heartbeat(imei: &str) -> String {
    format!("{imei};")
}

/// `##,imei:<imei>,<status>;`
pub fn command_heartbeat(imei: &str, status: &str) -> String {
    format!("##,imei:{imei},{status};")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
