//! Round-robin ranging against multiple responders
//!
//! The scheduler owns one record per configured responder and runs one
//! complete initiator round against each of them per sweep, in a fixed
//! cyclic order. Failures are node-local: a responder that doesn't answer
//! gets its record invalidated and the sweep moves on to the next one.
//! Because a round only ends in a terminal state, at most one exchange is
//! ever in flight and the transceiver needs no further arbitration.

use core::num::Wrapping;

use embedded_hal::blocking::delay::DelayMs;
use heapless::Vec;
use log::{info, warn};

use crate::config::{DeviceConfig, FailurePolicy, RangingConfig, SchedulerConfig};
use crate::error::Error;
use crate::radio::RadioTransport;
use crate::ranging::{InitiatorRound, RoundOutcome};

/// Last known ranging result for one responder
#[derive(Clone, Copy, Debug)]
pub struct ResponderRecord {
    /// The responder's node id
    pub id: u8,
    /// The last measured distance, in meters
    pub distance_m: f64,
    /// Whether the most recent round against this responder succeeded
    pub valid: bool,
}

/// Drives ranging rounds against a fixed set of responders
///
/// `N` is the capacity of the responder table; the configured set may be
/// smaller.
pub struct Scheduler<const N: usize> {
    records: Vec<ResponderRecord, N>,
    sequence: Wrapping<u8>,
    cfg: SchedulerConfig,
}

impl<const N: usize> Scheduler<N> {
    /// Creates a scheduler for the given responder ids
    ///
    /// # Panics
    ///
    /// Panics if more than `N` responder ids are given.
    pub fn new(cfg: SchedulerConfig, responder_ids: &[u8]) -> Self {
        assert!(
            responder_ids.len() <= N,
            "responder set exceeds scheduler capacity"
        );

        let mut records = Vec::new();
        for &id in responder_ids {
            // Capacity was checked above.
            let _ = records.push(ResponderRecord {
                id,
                distance_m: 0.0,
                valid: false,
            });
        }

        Scheduler {
            records,
            sequence: Wrapping(0),
            cfg,
        }
    }

    /// The per-responder results, in sweep order
    pub fn records(&self) -> &[ResponderRecord] {
        &self.records
    }

    /// Runs one complete sweep: one ranging round per responder
    ///
    /// `idle` is called every time the active round is waiting on the
    /// radio; this is where co-resident tasks get their share of the
    /// processor. A failed round marks its responder invalid and, under
    /// [`FailurePolicy::ResetDistance`], zeroes the stored distance so
    /// stale data is never reported as fresh. The sweep always visits
    /// every responder, no matter how many of them fail.
    pub fn run_sweep<R, D>(
        &mut self,
        radio: &mut R,
        dev: &mut DeviceConfig,
        ranging: &RangingConfig,
        delay: &mut D,
        mut idle: impl FnMut(),
    ) where
        R: RadioTransport,
        D: DelayMs<u16>,
    {
        for i in 0..self.records.len() {
            let id = self.records[i].id;
            dev.current_peer = id;

            let outcome = drive_round(radio, dev, ranging, self.sequence.0, &mut idle);
            self.sequence += Wrapping(1);

            let record = &mut self.records[i];
            match outcome {
                Ok(outcome) => {
                    record.valid = true;
                    if let Some(distance) = outcome.distance_m {
                        record.distance_m = distance;
                        info!("responder {}: {} m", id, distance);
                    }
                }
                Err(e) => {
                    warn!("ranging round with responder {} failed: {:?}", id, e);
                    record.valid = false;
                    if self.cfg.failure_policy == FailurePolicy::ResetDistance {
                        record.distance_m = 0.0;
                    }
                }
            }

            delay.delay_ms(self.cfg.settle_delay_ms);
        }

        delay.delay_ms(self.cfg.sweep_delay_ms);
    }
}

/// Runs a single initiator round to its terminal state
fn drive_round<R: RadioTransport>(
    radio: &mut R,
    dev: &DeviceConfig,
    ranging: &RangingConfig,
    sequence: u8,
    idle: &mut impl FnMut(),
) -> Result<RoundOutcome, Error> {
    let mut round = InitiatorRound::start(radio, dev, ranging, sequence)?;

    // The receive timeouts programmed into the hardware bound this loop.
    loop {
        match round.poll(radio) {
            Ok(outcome) => return Ok(outcome),
            Err(nb::Error::WouldBlock) => idle(),
            Err(nb::Error::Other(e)) => return Err(e),
        }
    }
}
