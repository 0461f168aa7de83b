//! Time-related types based on the transceiver's device time
//!
//! UWB transceivers in the DW1000/DW3000 family count time in device time
//! units (DTU) of 1/(128 * 499.2 MHz), about 15.65 picoseconds, in a 40-bit
//! counter that wraps roughly every 17 seconds. All protocol timing in this
//! crate is expressed in these units.

use core::ops::Add;
use serde::{Deserialize, Serialize};

/// The maximum value of 40-bit device time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Number of device time units per UWB microsecond (512/499.2 us)
///
/// Delays and timeouts in this crate's configuration are given in UWB
/// microseconds, the unit the transceiver's timeout registers use.
pub const UUS_TO_DTU: u64 = 65536;

/// Represents an instant in device time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if
    /// it isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use uwb_twr::time::{TIME_MAX, Instant};
    ///
    /// let valid_instant   = Instant::new(TIME_MAX);
    /// let invalid_instant = Instant::new(TIME_MAX + 1);
    ///
    /// assert!(valid_instant.is_some());
    /// assert!(invalid_instant.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the truncated 32-bit view of this timestamp
    ///
    /// Ranging frames carry timestamps truncated to their lower 32 bits;
    /// the time-of-flight math is written to be correct under this
    /// truncation as long as the measured intervals stay below the 32-bit
    /// wraparound window.
    pub fn lo32(&self) -> u32 {
        self.0 as u32
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than the argument
    /// `earlier`. Please make sure that this is the case, as this method
    /// has no way of knowing (device timestamps can overflow, so comparing
    /// the numerical value of the timestamp doesn't tell anything about
    /// order).
    ///
    /// # Example
    ///
    /// ``` rust
    /// use uwb_twr::time::{TIME_MAX, Instant};
    ///
    /// // `unwrap`ing here is okay, since we're passing constants that we
    /// // know are in the valid range.
    /// let instant_1 = Instant::new(TIME_MAX - 50).unwrap();
    /// let instant_2 = Instant::new(TIME_MAX).unwrap();
    /// let instant_3 = Instant::new(49).unwrap();
    ///
    /// // Works as expected, if the later timestamp is larger than the
    /// // earlier one.
    /// let duration = instant_2.duration_since(instant_1);
    /// assert_eq!(duration.value(), 50);
    ///
    /// // Still works as expected, if the later timestamp is the
    /// // numerically smaller value.
    /// let duration = instant_3.duration_since(instant_2);
    /// assert_eq!(duration.value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.value() >= earlier.value() {
            Duration(self.value() - earlier.value())
        } else {
            Duration(TIME_MAX - earlier.value() + self.value() + 1)
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both `Instant` and `Duration` are guaranteed to contain 40-bit
        // numbers, so this addition will never overflow.
        let value = (self.value() + rhs.value()) % (TIME_MAX + 1);

        // We made sure to keep the result of the addition within
        // `TIME_MAX`, so the following will never panic.
        Instant::new(value).unwrap()
    }
}

/// A duration between two instants in device time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if
    /// it isn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates an instance of `Duration` from a number of UWB microseconds
    ///
    /// Device time wraps at 2^40, and this conversion wraps the same way,
    /// so the result is always a valid duration.
    pub fn from_uus(uus: u32) -> Self {
        let value = (uus as u64 * UUS_TO_DTU) % (TIME_MAX + 1);

        // The modulo above keeps the result within `TIME_MAX`, so the
        // following will never panic.
        Duration::new(value).unwrap()
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }
}
