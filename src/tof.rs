//! Time-of-flight and distance computation
//!
//! Pure functions from a [`TimestampSet`] to a distance. No radio access,
//! no side effects; every value here can be checked against literal
//! timestamp fixtures.
//!
//! All inputs are treated as 32-bit truncated device timestamps. The
//! differences are taken with wrapping arithmetic, so a timestamp that
//! wrapped past 2^32 between two events yields the same interval as one
//! that didn't, as long as the interval itself stays below the wraparound
//! window.
//!
//! Results are returned exactly as computed. A negative distance means the
//! timestamps or the antenna-delay calibration are wrong, and hiding that
//! by clamping would only make the fault harder to find.

use crate::ranging::TimestampSet;

/// Speed of light in air, in meters per second
pub const SPEED_OF_LIGHT_M_S: f64 = 299_702_547.0;

/// Length of one device time unit, in seconds (1/(128 * 499.2 MHz))
pub const DTU_SECONDS: f64 = 1.0 / (128.0 * 499_200_000.0);

/// Computes the single-sided time of flight, in device time units
///
/// `((resp_rx - poll_tx) - (resp_tx - poll_rx)) / 2`: half the round trip
/// minus the responder's turnaround. The result carries the full clock
/// offset error between the two nodes; prefer the double-sided variant
/// when accuracy matters.
pub fn ss_twr_tof_dtu(ts: &TimestampSet) -> f64 {
    let round_trip = (ts.resp_rx as u32).wrapping_sub(ts.poll_tx as u32);
    let turnaround = (ts.resp_tx as u32).wrapping_sub(ts.poll_rx as u32);

    (round_trip as i64 - turnaround as i64) as f64 / 2.0
}

/// Computes the double-sided time of flight, in device time units
///
/// Uses the asymmetric formula `(Ra*Rb - Da*Db) / (Ra + Rb + Da + Db)`
/// over the two round trips and the two turnarounds, which cancels clock
/// drift between the nodes to first order. The intervals are widened to
/// i64 before multiplying; the products of realistic ranging intervals
/// stay far below the i64 range.
pub fn ds_twr_tof_dtu(ts: &TimestampSet) -> i64 {
    let ra = (ts.resp_rx as u32).wrapping_sub(ts.poll_tx as u32) as i64;
    let rb = (ts.final_rx as u32).wrapping_sub(ts.resp_tx as u32) as i64;
    let da = (ts.final_tx as u32).wrapping_sub(ts.resp_rx as u32) as i64;
    let db = (ts.resp_tx as u32).wrapping_sub(ts.poll_rx as u32) as i64;

    (ra * rb - da * db) / (ra + rb + da + db)
}

/// Converts a time of flight in device time units to meters
pub fn distance_m(tof_dtu: f64) -> f64 {
    tof_dtu * DTU_SECONDS * SPEED_OF_LIGHT_M_S
}
