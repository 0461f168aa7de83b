//! Ranging message definitions and their wire codec
//!
//! All ranging frames share a 4-byte header followed by a fixed,
//! kind-specific payload. There are no variable-length fields; every
//! multi-byte quantity is packed little-endian. Because frame sizes are
//! fixed, validation is two-staged: a received frame must first have
//! exactly the wire size of the message awaited at the current protocol
//! step, and its decoded `id` must then match the kind expected at that
//! step. Either mismatch rejects the frame; nothing is ever coerced.
//!
//! Timestamps inside messages are truncated to 32 bits on purpose. They
//! wrap within the ranging window, and the time-of-flight math in
//! [`crate::tof`] relies on wraparound-safe subtraction to undo the
//! truncation.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The kinds of messages exchanged during a ranging round
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    /// Poll opening a ranging round (initiator → responder)
    TwrPoll = 1,
    /// DS-TWR response to a poll (responder → initiator)
    DsTwrResponse = 2,
    /// DS-TWR final message carrying the initiator's timestamps
    DsTwrFinal = 3,
    /// SS-TWR response carrying the responder's timestamps
    SsTwrResponse = 4,
    /// DS-TWR distance report closing a reporting round
    DsTwrReport = 5,
    /// Final-message variant carrying sensing data next to the timestamps
    SensingFinal = 6,
}

/// Common header of every ranging frame
///
/// `sequence` is the initiator's round counter, echoed by all frames of
/// the round. `source` and `dest` are application-assigned node ids; the
/// protocol does not enforce their uniqueness.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Header {
    /// Message kind, as a raw id byte (see [`MessageKind`])
    pub id: u8,
    /// Round counter, assigned by the initiator
    pub sequence: u8,
    /// Node id of the sender
    pub source: u8,
    /// Node id of the addressed receiver
    pub dest: u8,
}

impl Header {
    /// Creates a header for a new frame
    pub fn new(kind: MessageKind, sequence: u8, source: u8, dest: u8) -> Self {
        Header {
            id: kind.into(),
            sequence,
            source,
            dest,
        }
    }

    /// Creates the header of a reply to this frame
    ///
    /// Echoes the sequence number and swaps source and destination.
    pub fn reply(&self, kind: MessageKind) -> Self {
        Header {
            id: kind.into(),
            sequence: self.sequence,
            source: self.dest,
            dest: self.source,
        }
    }
}

/// Implemented by all ranging messages
///
/// Messages serialize to exactly [`Self::LEN`] bytes. `LEN` is spelled out
/// per message rather than derived from the in-memory size, so that struct
/// padding can never leak into the wire image.
///
/// # Example
///
/// ``` rust
/// use uwb_twr::message::{Header, MessageKind, SimpleMsg, WireMessage};
///
/// let poll = SimpleMsg {
///     header: Header::new(MessageKind::TwrPoll, 5, 1, 100),
///     reserved: 0,
/// };
///
/// let mut buf = [0; SimpleMsg::LEN];
/// poll.encode(&mut buf).unwrap();
/// assert_eq!(buf, [0x01, 0x05, 0x01, 0x64, 0x00]);
///
/// let decoded = SimpleMsg::decode(&buf, MessageKind::TwrPoll).unwrap();
/// assert_eq!(decoded, poll);
/// ```
pub trait WireMessage: Sized + Serialize + for<'de> Deserialize<'de> {
    /// The fixed wire size of this message, in bytes
    const LEN: usize;

    /// The message header
    fn header(&self) -> &Header;

    /// Serializes this message into `buf`
    ///
    /// Writes exactly [`Self::LEN`] bytes and returns that length.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = ssmarshal::serialize(buf, self)?;
        debug_assert_eq!(len, Self::LEN);
        Ok(len)
    }

    /// Deserializes a received frame, validating it against `expected`
    ///
    /// The frame must have exactly [`Self::LEN`] bytes and carry the
    /// expected id. On any mismatch no message is produced.
    fn decode(bytes: &[u8], expected: MessageKind) -> Result<Self, Error> {
        if bytes.len() != Self::LEN {
            return Err(Error::FrameLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }

        let (msg, _) = ssmarshal::deserialize::<Self>(bytes)?;

        if msg.header().id != u8::from(expected) {
            return Err(Error::FrameId {
                expected,
                actual: msg.header().id,
            });
        }

        Ok(msg)
    }
}

/// Header-only frame, used for polls and DS-TWR responses
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct SimpleMsg {
    /// Message header
    pub header: Header,
    /// Reserved padding
    pub reserved: u8,
}

impl WireMessage for SimpleMsg {
    const LEN: usize = 5;

    fn header(&self) -> &Header {
        &self.header
    }
}

/// SS-TWR response, carrying the responder's two timestamps
///
/// `resp_tx_ts` is the predicted transmission timestamp; the message is
/// written before the scheduled transmission happens.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct SsTwrResponseMsg {
    /// Message header
    pub header: Header,
    /// When the poll was received, in responder time (truncated)
    pub poll_rx_ts: u32,
    /// When this response leaves the antenna, in responder time (truncated)
    pub resp_tx_ts: u32,
    /// Reserved padding
    pub reserved: u8,
}

impl WireMessage for SsTwrResponseMsg {
    const LEN: usize = 13;

    fn header(&self) -> &Header {
        &self.header
    }
}

/// DS-TWR final message, carrying the initiator's three timestamps
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct DsTwrFinalMsg {
    /// Message header
    pub header: Header,
    /// When the poll was sent, in initiator time (truncated)
    pub poll_tx_ts: u32,
    /// When the response was received, in initiator time (truncated)
    pub resp_rx_ts: u32,
    /// When this message leaves the antenna, in initiator time (truncated)
    pub final_tx_ts: u32,
    /// Reserved padding
    pub reserved: u8,
}

impl WireMessage for DsTwrFinalMsg {
    const LEN: usize = 17;

    fn header(&self) -> &Header {
        &self.header
    }
}

/// DS-TWR distance report, echoing the final-message timestamps
///
/// Sent by a responder after a completed double-sided exchange, so the
/// initiator learns the drift-cancelled distance it cannot compute
/// locally.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct DsTwrReportMsg {
    /// Message header
    pub header: Header,
    /// Echo of the final message's poll TX timestamp
    pub poll_tx_ts: u32,
    /// Echo of the final message's response RX timestamp
    pub resp_rx_ts: u32,
    /// Echo of the final message's final TX timestamp
    pub final_tx_ts: u32,
    /// The computed distance, in meters
    pub distance: f32,
    /// Reserved padding
    pub reserved: u8,
}

impl WireMessage for DsTwrReportMsg {
    const LEN: usize = 21;

    fn header(&self) -> &Header {
        &self.header
    }
}

/// Final-message variant with an application sensing payload
///
/// Structurally a [`DsTwrFinalMsg`] with extra payload bytes; validated
/// the same way, told apart by id and size. The engine round-trips it but
/// never emits it; sensing applications build it themselves.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct SensingMsg {
    /// Message header
    pub header: Header,
    /// When the poll was sent, in initiator time (truncated)
    pub poll_tx_ts: u32,
    /// When the response was received, in initiator time (truncated)
    pub resp_rx_ts: u32,
    /// When this message leaves the antenna, in initiator time (truncated)
    pub final_tx_ts: u32,
    /// Opaque application sensing payload
    pub sensing: [u8; 8],
    /// Reserved padding
    pub reserved: u8,
}

impl WireMessage for SensingMsg {
    const LEN: usize = 25;

    fn header(&self) -> &Header {
        &self.header
    }
}
