//! Link operations: thin orchestration over the radio transport
//!
//! These functions bridge the ranging state machines to the transceiver,
//! handling the timing and status-register bookkeeping every exchange
//! needs: starting immediate and scheduled transmissions, arming the
//! receiver, and turning status-register events into validated messages
//! or errors.
//!
//! The waiting functions ([`poll_frame`], [`poll_tx_done`]) check the
//! status register exactly once per call and return
//! `nb::Error::WouldBlock` while nothing has happened yet. Callers poll
//! them from a cooperative loop; the hardware timeouts programmed into
//! the receiver bound how long that can go on.

use log::{error, info, warn};

use crate::error::Error;
use crate::message::{MessageKind, WireMessage};
use crate::radio::{status, RadioTransport, RxMode, TxMode};

/// Upper bound on the wire size of any ranging frame
pub const MAX_FRAME_LEN: usize = 32;

/// Starts an immediate transmission that expects an answer
///
/// Clears the TX-sent event first so [`poll_tx_done`] observes this
/// frame, and arms the receiver to open automatically after the frame is
/// out, with whatever delay and timeouts were programmed beforehand.
pub fn send_now<R: RadioTransport>(radio: &mut R, frame: &[u8]) {
    radio.clear_status(status::TX_FRAME_SENT);
    // An immediate start can't be late.
    let _ = radio.start_transmit(frame, TxMode::Immediate, true);
}

/// Starts a transmission at a scheduled device time
///
/// `tx_time` holds bits 39:8 of the target device time. If the scheduled
/// moment can no longer be met, the start is rejected: stale receive
/// errors are recovered, the status register is re-read, and the round
/// fails with [`Error::LateTransmit`].
pub fn send_at<R: RadioTransport>(radio: &mut R, frame: &[u8], tx_time: u32) -> Result<(), Error> {
    start_delayed(radio, frame, tx_time, false)
}

/// Like [`send_at`], but arms the receiver for the answer to this frame
///
/// Used when the scheduled frame itself expects a reply, e.g. a DS-TWR
/// response that will be followed by the final message.
pub fn send_at_expecting_response<R: RadioTransport>(
    radio: &mut R,
    frame: &[u8],
    tx_time: u32,
) -> Result<(), Error> {
    start_delayed(radio, frame, tx_time, true)
}

fn start_delayed<R: RadioTransport>(
    radio: &mut R,
    frame: &[u8],
    tx_time: u32,
    response_expected: bool,
) -> Result<(), Error> {
    radio.clear_status(status::TX_FRAME_SENT);
    radio.set_delayed_tx_time(tx_time);

    match radio.start_transmit(frame, TxMode::Delayed, response_expected) {
        Ok(()) => Ok(()),
        Err(_) => {
            recover_rx_errors(radio);
            let status_reg = radio.read_status();
            warn!("delayed transmission started too late (status {:#010x})", status_reg);
            Err(Error::LateTransmit)
        }
    }
}

/// Arms the receiver immediately, with the given timeouts
pub fn receive_now<R: RadioTransport>(radio: &mut R, preamble_timeout: u16, rx_timeout_uus: u32) {
    radio.set_preamble_detect_timeout(preamble_timeout);
    radio.set_rx_timeout(rx_timeout_uus);
    if radio.start_receive(RxMode::Immediate).is_err() {
        error!("receiver enable failed");
    }
}

/// Arms the receiver at the previously programmed device time
///
/// A timeout of 0 disables the frame wait timeout. A late delayed enable
/// drops the radio back to idle; the round then runs into its timeout.
pub fn receive_at<R: RadioTransport>(radio: &mut R, rx_timeout_uus: u32) {
    radio.set_preamble_detect_timeout(0);
    radio.set_rx_timeout(rx_timeout_uus);
    let _ = radio.start_receive(RxMode::Delayed);
}

/// Waits for the running transmission to leave the antenna
///
/// Returns `WouldBlock` until the TX-sent event is up, then clears all TX
/// event bits.
pub fn poll_tx_done<R: RadioTransport>(radio: &mut R) -> nb::Result<(), Error> {
    let status_reg = radio.read_status();
    if status_reg & status::TX_FRAME_SENT == 0 {
        return Err(nb::Error::WouldBlock);
    }

    radio.clear_status(status::ALL_TX);
    Ok(())
}

/// Waits for a frame and validates it against the awaited message
///
/// Returns `WouldBlock` until the receiver reports either a good frame or
/// a timeout/error condition.
///
/// On a good frame, the reported length must equal the awaited message's
/// fixed size and the decoded id must match `expected`; any mismatch
/// counts as "no valid message". This function doesn't judge whether a
/// failure is worth retrying; that is the caller's call.
///
/// On a timeout or receive error, the offending status bits are cleared
/// and the transceiver is forced idle, so the next operation starts
/// clean.
pub fn poll_frame<R: RadioTransport, M: WireMessage>(
    radio: &mut R,
    expected: MessageKind,
) -> nb::Result<M, Error> {
    let status_reg = radio.read_status();
    if status_reg & (status::RX_FRAME_GOOD | status::ALL_RX_TIMEOUT | status::ALL_RX_ERROR) == 0 {
        return Err(nb::Error::WouldBlock);
    }

    if status_reg & status::RX_FRAME_GOOD != 0 {
        radio.clear_status(status::RX_FRAME_GOOD);

        let frame_length = radio.frame_length() as usize;
        if frame_length != M::LEN {
            error!("rx frame length {} != expected {}", frame_length, M::LEN);
            return Err(nb::Error::Other(Error::FrameLength {
                expected: M::LEN,
                actual: frame_length,
            }));
        }

        assert!(M::LEN <= MAX_FRAME_LEN);
        let mut buf = [0; MAX_FRAME_LEN];
        radio.read_frame(&mut buf[..frame_length]);

        match M::decode(&buf[..frame_length], expected) {
            Ok(msg) => Ok(msg),
            Err(e) => {
                error!("rx frame rejected: {:?}", e);
                Err(nb::Error::Other(e))
            }
        }
    } else {
        radio.clear_status(status::ALL_RX_TIMEOUT | status::ALL_RX_ERROR);
        radio.force_idle();
        warn!("no good rx frame (status {:#010x})", status_reg);
        Err(nb::Error::Other(Error::RxFailed { status: status_reg }))
    }
}

/// Clears stale receive errors left over from an aborted operation
///
/// A delayed transmission that starts too late can leave a checksum-error
/// event armed from the receive window it cut short. If the FCS-error bit
/// is set, all RX timeout and error bits are cleared in one go.
pub fn recover_rx_errors<R: RadioTransport>(radio: &mut R) {
    let status_reg = radio.read_status();
    if status_reg & status::RX_FCS_ERROR != 0 {
        info!("recovering rx errors {:#010x}", status_reg & status::RX_FCS_ERROR);
        radio.clear_status(status::ALL_RX_TIMEOUT | status::ALL_RX_ERROR);
    }
}
