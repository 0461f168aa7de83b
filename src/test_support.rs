//! Scripted radio double for the unit tests
//!
//! `MockRadio` plays back a script of status-register values, received
//! frames and timestamps, and records everything the engine does to it:
//! transmitted frames, cleared status bits, programmed delayed-TX times
//! and timeouts. Tests assert on those records.

use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;

use crate::message::WireMessage;
use crate::radio::{RadioTransport, RxEnableFailed, RxMode, TxLate, TxMode};
use crate::time::Instant;

/// One frame handed to `start_transmit`
#[derive(Clone, Debug)]
pub struct SentFrame {
    pub data: Vec<u8>,
    pub mode: TxMode,
    pub response_expected: bool,
}

pub struct MockRadio {
    status_script: VecDeque<u32>,
    frames: VecDeque<Vec<u8>>,
    tx_stamps: VecDeque<u64>,
    rx_stamps: VecDeque<u64>,
    last_tx_stamp: u64,
    last_rx_stamp: u64,
    transmit_results: VecDeque<Result<(), TxLate>>,

    pub sent: Vec<SentFrame>,
    pub cleared: Vec<u32>,
    pub delayed_tx_times: Vec<u32>,
    pub rx_after_tx_delays: Vec<u32>,
    pub rx_timeouts: Vec<u32>,
    pub preamble_timeouts: Vec<u16>,
    pub rx_starts: Vec<RxMode>,
    pub forced_idle: usize,
}

impl MockRadio {
    pub fn new() -> Self {
        MockRadio {
            status_script: VecDeque::new(),
            frames: VecDeque::new(),
            tx_stamps: VecDeque::new(),
            rx_stamps: VecDeque::new(),
            last_tx_stamp: 0,
            last_rx_stamp: 0,
            transmit_results: VecDeque::new(),
            sent: Vec::new(),
            cleared: Vec::new(),
            delayed_tx_times: Vec::new(),
            rx_after_tx_delays: Vec::new(),
            rx_timeouts: Vec::new(),
            preamble_timeouts: Vec::new(),
            rx_starts: Vec::new(),
            forced_idle: 0,
        }
    }

    /// Scripts the next value `read_status` returns
    pub fn push_status(&mut self, status: u32) {
        self.status_script.push_back(status);
    }

    /// Scripts the next received frame, as raw bytes
    pub fn push_frame(&mut self, bytes: &[u8]) {
        self.frames.push_back(bytes.to_vec());
    }

    /// Scripts the next received frame, encoding a message
    pub fn push_frame_msg<M: WireMessage>(&mut self, msg: &M) {
        let mut buf = [0; crate::link::MAX_FRAME_LEN];
        let len = msg.encode(&mut buf).unwrap();
        self.push_frame(&buf[..len]);
    }

    /// Scripts the next TX timestamp; the last one scripted sticks
    pub fn push_tx_stamp(&mut self, stamp: u64) {
        self.tx_stamps.push_back(stamp);
    }

    /// Scripts the next RX timestamp; the last one scripted sticks
    pub fn push_rx_stamp(&mut self, stamp: u64) {
        self.rx_stamps.push_back(stamp);
    }

    /// Makes the next `start_transmit` fail as a late delayed start
    pub fn fail_next_transmit(&mut self) {
        self.transmit_results.push_back(Err(TxLate));
    }
}

impl RadioTransport for MockRadio {
    fn read_status(&mut self) -> u32 {
        self.status_script
            .pop_front()
            .expect("status script exhausted")
    }

    fn clear_status(&mut self, mask: u32) {
        self.cleared.push(mask);
    }

    fn force_idle(&mut self) {
        self.forced_idle += 1;
    }

    fn set_delayed_tx_time(&mut self, time: u32) {
        self.delayed_tx_times.push(time);
    }

    fn set_rx_after_tx_delay(&mut self, delay_uus: u32) {
        self.rx_after_tx_delays.push(delay_uus);
    }

    fn set_rx_timeout(&mut self, timeout_uus: u32) {
        self.rx_timeouts.push(timeout_uus);
    }

    fn set_preamble_detect_timeout(&mut self, timeout: u16) {
        self.preamble_timeouts.push(timeout);
    }

    fn start_transmit(
        &mut self,
        frame: &[u8],
        mode: TxMode,
        response_expected: bool,
    ) -> Result<(), TxLate> {
        let result = self.transmit_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.sent.push(SentFrame {
                data: frame.to_vec(),
                mode,
                response_expected,
            });
        }
        result
    }

    fn start_receive(&mut self, mode: RxMode) -> Result<(), RxEnableFailed> {
        self.rx_starts.push(mode);
        Ok(())
    }

    fn frame_length(&mut self) -> u16 {
        self.frames.front().expect("no frame scripted").len() as u16
    }

    fn read_frame(&mut self, buf: &mut [u8]) {
        let frame = self.frames.pop_front().expect("no frame scripted");
        buf.copy_from_slice(&frame[..buf.len()]);
    }

    fn tx_timestamp(&mut self) -> Instant {
        if let Some(stamp) = self.tx_stamps.pop_front() {
            self.last_tx_stamp = stamp;
        }
        Instant::new(self.last_tx_stamp).unwrap()
    }

    fn rx_timestamp(&mut self) -> Instant {
        if let Some(stamp) = self.rx_stamps.pop_front() {
            self.last_rx_stamp = stamp;
        }
        Instant::new(self.last_rx_stamp).unwrap()
    }
}

/// Delay provider that only records what it was asked to wait for
pub struct MockDelay {
    pub delays_ms: Vec<u16>,
}

impl MockDelay {
    pub fn new() -> Self {
        MockDelay {
            delays_ms: Vec::new(),
        }
    }
}

impl DelayMs<u16> for MockDelay {
    fn delay_ms(&mut self, ms: u16) {
        self.delays_ms.push(ms);
    }
}
