//! Two-way ranging engine for UWB transceivers
//!
//! This crate implements the protocol side of UWB distance measurement:
//! single-sided and double-sided two-way ranging (SS-TWR/DS-TWR), the
//! time-of-flight computation, and a round-robin scheduler that ranges
//! against multiple responders in turn.
//!
//! The radio itself is not part of this crate. The engine talks to the
//! transceiver through the [`RadioTransport`] trait, which exposes the small
//! set of operations two-way ranging needs: immediate and delayed
//! transmission, receiving with hardware timeouts, the event status
//! register, and the TX/RX timestamps. Implement that trait on top of your
//! radio driver and the rest of the crate is hardware-independent.
//!
//! A ranging exchange is driven by one of two state machines, depending on
//! the role of the node:
//! - [`InitiatorRound`] sends a poll, validates the response, and (for
//!   DS-TWR) sends the final message at a scheduled transmission time.
//! - [`ResponderRound`] listens for a poll addressed to this node, answers
//!   at a scheduled time, and (for DS-TWR) validates the final message,
//!   which completes the timestamp set needed for the drift-cancelling
//!   double-sided formula.
//!
//! Both machines are polled: every call to `poll` checks the status
//! register at most once and returns [`nb::Result`], so `WouldBlock` is the
//! natural point to yield to other cooperative tasks on the node. Hardware
//! receive timeouts terminate a round that gets no (valid) answer; there is
//! no other cancellation path.
//!
//! On top of a single round, [`Scheduler`] runs one round per configured
//! responder per sweep. A responder that fails to answer only affects its
//! own record; the sweep continues with the next one.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod link;
pub mod message;
pub mod radio;
pub mod ranging;
pub mod scheduler;
pub mod time;
pub mod tof;

#[cfg(test)]
mod test_support;

pub use crate::{
    config::{DeviceConfig, FailurePolicy, RangingConfig, Role, Scheme, SchedulerConfig},
    error::Error,
    message::{
        DsTwrFinalMsg, DsTwrReportMsg, Header, MessageKind, SensingMsg, SimpleMsg,
        SsTwrResponseMsg, WireMessage,
    },
    radio::{RadioTransport, RxMode, TxMode},
    ranging::{InitiatorRound, ResponderRound, RoundOutcome, TimestampSet},
    scheduler::{ResponderRecord, Scheduler},
    time::{Duration, Instant, TIME_MAX},
};
