//! Errors that can terminate a ranging round

use crate::message::MessageKind;

/// An error that occurred during a ranging exchange
///
/// All of these are local to a single round: the round that hits one of
/// them is abandoned, and the scheduler simply moves on to the next
/// responder. None of them is fatal to the node.
#[derive(Debug)]
pub enum Error {
    /// A received frame's length doesn't match the awaited message
    FrameLength {
        /// The fixed wire size of the awaited message
        expected: usize,
        /// The length reported by the receiver
        actual: usize,
    },

    /// A received frame's id doesn't match the awaited message kind
    FrameId {
        /// The message kind expected at this protocol step
        expected: MessageKind,
        /// The id field actually decoded from the frame
        actual: u8,
    },

    /// The receiver reported a timeout or a frame error instead of a good
    /// frame
    RxFailed {
        /// The status register value at the time of the failure
        status: u32,
    },

    /// A scheduled transmission was issued too late to meet its programmed
    /// time
    LateTransmit,

    /// A message could not be serialized or deserialized
    Codec(ssmarshal::Error),
}

impl From<ssmarshal::Error> for Error {
    fn from(error: ssmarshal::Error) -> Self {
        Error::Codec(error)
    }
}
