//! Configuration passed into the ranging engine
//!
//! Everything the state machines and the scheduler need to know about the
//! node is carried in these structs and handed in by reference. There is
//! no ambient global device state; a test can run the whole engine with
//! any configuration it likes.

use crate::time::Duration;

/// The role a node plays in ranging exchanges
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Opens rounds by sending polls
    Initiator,
    /// Listens for polls addressed to it
    Responder,
}

/// The two-way ranging scheme in use
///
/// Double-sided ranging cancels first-order clock drift between the two
/// nodes and is the more accurate choice; single-sided ranging needs one
/// message less.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scheme {
    /// Single-sided two-way ranging (poll/response)
    SsTwr,
    /// Double-sided two-way ranging (poll/response/final)
    DsTwr,
}

/// Identity and ranging partner of this node
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    /// This node's application-assigned id
    pub device_id: u8,
    /// The role this node currently plays
    pub role: Role,
    /// The peer the current round is addressed to
    ///
    /// The scheduler updates this before every round; standalone rounds
    /// set it once.
    pub current_peer: u8,
}

impl DeviceConfig {
    /// Creates a device configuration with no peer selected yet
    pub fn new(device_id: u8, role: Role) -> Self {
        DeviceConfig {
            device_id,
            role,
            current_peer: 0,
        }
    }
}

/// Protocol timing and behavior of a single ranging round
///
/// The delays must be long enough for the remote side to turn its frame
/// around; the timeouts bound how long a round can wait for an answer
/// before the hardware gives up. Values are in UWB microseconds unless
/// noted otherwise. The defaults are the turnaround budget of a ~400 us
/// processing-time node at 64 MHz PRF.
#[derive(Clone, Copy, Debug)]
pub struct RangingConfig {
    /// Ranging scheme to run
    pub scheme: Scheme,

    /// Initiator: delay from poll TX end to the response receive window
    pub poll_tx_to_resp_rx_delay_uus: u32,
    /// Initiator: receive timeout for the response
    pub resp_rx_timeout_uus: u32,
    /// Initiator: turnaround from response RX to the scheduled final TX
    pub resp_rx_to_final_tx_delay_uus: u32,
    /// Initiator: delay from final TX end to the report receive window
    pub final_tx_to_report_rx_delay_uus: u32,
    /// Initiator: receive timeout for the distance report
    pub report_rx_timeout_uus: u32,

    /// Responder: turnaround from poll RX to the scheduled response TX
    pub poll_rx_to_resp_tx_delay_uus: u32,
    /// Responder: delay from response TX end to the final receive window
    pub resp_tx_to_final_rx_delay_uus: u32,
    /// Responder: receive timeout for the final message
    pub final_rx_timeout_uus: u32,
    /// Responder: turnaround from final RX to the scheduled report TX
    pub final_rx_to_report_tx_delay_uus: u32,

    /// Preamble detection timeout, in PAC units; 0 disables
    pub preamble_detect_timeout: u16,

    /// TX antenna delay calibration of this node, in device time units
    pub tx_antenna_delay: Duration,

    /// Close DS-TWR rounds with a distance report from the responder
    ///
    /// Without the report, the double-sided result only exists on the
    /// responder and a completed initiator round carries no distance.
    pub report_distance: bool,
}

/// Default antenna delay for 64 MHz PRF modules
const TX_ANT_DLY: u64 = 16385;

impl Default for RangingConfig {
    fn default() -> Self {
        RangingConfig {
            scheme: Scheme::DsTwr,
            poll_tx_to_resp_rx_delay_uus: 750,
            resp_rx_timeout_uus: 1150,
            resp_rx_to_final_tx_delay_uus: 750,
            final_tx_to_report_rx_delay_uus: 600,
            report_rx_timeout_uus: 1200,
            poll_rx_to_resp_tx_delay_uus: 900,
            resp_tx_to_final_rx_delay_uus: 600,
            final_rx_timeout_uus: 1200,
            final_rx_to_report_tx_delay_uus: 900,
            preamble_detect_timeout: 5,
            // The constant is well below TIME_MAX, so this never panics.
            tx_antenna_delay: Duration::new(TX_ANT_DLY).unwrap(),
            report_distance: true,
        }
    }
}

/// What happens to a responder's stored distance when its round fails
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailurePolicy {
    /// Reset the stored distance to 0.0, so stale data is never mistaken
    /// for a fresh measurement
    ResetDistance,
    /// Keep the last successfully measured distance
    RetainLast,
}

/// Behavior of the multi-responder scheduler
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Settle delay between two responders within a sweep, in ms
    pub settle_delay_ms: u16,
    /// Additional delay between two sweeps, in ms
    pub sweep_delay_ms: u16,
    /// Distance handling for failed rounds
    pub failure_policy: FailurePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            settle_delay_ms: 50,
            sweep_delay_ms: 100,
            failure_policy: FailurePolicy::ResetDistance,
        }
    }
}
