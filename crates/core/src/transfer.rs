//! Interrupt transfer state machine.
//!
//! Each channel (button, trackpad) cycles submit → complete → resubmit. The
//! transition function is pure: it takes the channel's context and one event
//! and returns the next context plus the actions the driver must carry out.
//! Arming is a single shared action reached from the initial setup, from a
//! delivered frame, from a dropped frame and from a cleared stall.
//!
//! Bounded retry: every short packet or transport failure bumps the
//! channel's error counter and any full-length frame resets it. Once the
//! counter reaches [`ERROR_LIMIT`] the channel stops arming until it is
//! stopped and started again. The policy is the same for every channel.

use crate::error::Result;
use crate::profile::DeviceProfile;
use serde::Serialize;

/// Consecutive errors tolerated before a channel halts.
pub const ERROR_LIMIT: u32 = 5;

/// Interrupt endpoint served by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Button,
    Trackpad,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Button, Channel::Trackpad];

    /// USB endpoint address.
    pub fn endpoint(self) -> u8 {
        match self {
            Self::Button => 0x84,
            Self::Trackpad => 0x81,
        }
    }

    /// Frame length expected on this channel for `profile`.
    pub fn expected_len(self, profile: &DeviceProfile) -> usize {
        match self {
            Self::Button => profile.button_frame_len,
            Self::Trackpad => profile.trackpad_frame_len,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Button => 0,
            Self::Trackpad => 1,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Button => write!(f, "button"),
            Self::Trackpad => write!(f, "trackpad"),
        }
    }
}

/// Identifies one submission: the channel plus the run it was armed in.
///
/// Hosts hand the id back with the completion so that a report for a
/// transfer from before the last `start` can be told apart from a current
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId {
    pub channel: Channel,
    pub generation: u32,
}

/// Why a transfer failed at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Transfer aborted because the channel is being torn down.
    Cancelled,
    /// Endpoint halted; needs a clear before further transfers succeed.
    Stalled,
    /// Any other transport fault (timeout, CRC, babble, ...).
    Fault,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Stalled => write!(f, "stalled"),
            Self::Fault => write!(f, "transport fault"),
        }
    }
}

/// Outcome reported by the host for one interrupt transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Transfer finished; `len` is the actual length reported by the host.
    Transferred { len: usize },
    Failed(TransportError),
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Channel (re)started: arm the first transfer.
    Setup,
    Completed(Completion),
}

/// Per-channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Transfer armed, or about to be.
    Setup,
    /// A transfer completed.
    Transferred,
    /// The transport reported a failure.
    Error,
}

/// Work the driver performs after a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Oversize packet clamped to the expected length.
    Truncated { from: usize, to: usize },
    /// Short packet discarded.
    DroppedShort { len: usize, expected: usize },
    /// Decode the first `len` bytes of the frame and deliver the result.
    Deliver { len: usize },
    /// Clear the endpoint halt before the next submit.
    ClearStall,
    /// Submit a transfer of `len` bytes if the sink has spare capacity.
    Arm { len: usize },
    /// Error limit reached; nothing more is submitted.
    Halt { errors: u32 },
    /// Transfer cancelled; the channel is going down.
    Stopped,
}

/// State of one channel of one device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferContext {
    pub channel: Channel,
    pub state: TransferState,
    /// Consecutive errors, `0..=ERROR_LIMIT`.
    pub errors: u32,
    /// Between `start` and `stop` (or cancellation).
    pub running: bool,
    /// Bumped on every `start`.
    pub generation: u32,
}

impl TransferContext {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: TransferState::Setup,
            errors: 0,
            running: false,
            generation: 0,
        }
    }

    /// Fresh start: counter cleared, back in Setup, new generation.
    pub fn start(&mut self) {
        self.state = TransferState::Setup;
        self.errors = 0;
        self.running = true;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Id for a transfer armed now.
    pub fn id(&self) -> TransferId {
        TransferId {
            channel: self.channel,
            generation: self.generation,
        }
    }

    /// Whether `id` belongs to the current run of this channel.
    pub fn owns(&self, id: TransferId) -> bool {
        id == self.id()
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Counter has reached the limit; the channel no longer arms.
    pub fn is_halted(&self) -> bool {
        self.errors >= ERROR_LIMIT
    }
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: TransferContext,
    pub actions: Vec<Action>,
}

/// Shared "back to setup" step: arm again, or halt once the limit is hit.
fn setup(mut ctx: TransferContext, expected_len: usize, actions: &mut Vec<Action>) -> TransferContext {
    ctx.state = TransferState::Setup;
    if ctx.is_halted() {
        actions.push(Action::Halt { errors: ctx.errors });
    } else {
        actions.push(Action::Arm { len: expected_len });
    }
    ctx
}

fn count_error(mut ctx: TransferContext) -> TransferContext {
    ctx.errors = (ctx.errors + 1).min(ERROR_LIMIT);
    ctx
}

/// Compute the next context and actions for `event`.
///
/// Events on a channel that is not running, or that has halted, produce no
/// actions.
pub fn transition(ctx: TransferContext, event: Event, expected_len: usize) -> Transition {
    let mut actions = Vec::with_capacity(3);
    if !ctx.running || ctx.is_halted() {
        return Transition { next: ctx, actions };
    }

    let next = match event {
        Event::Setup => setup(ctx, expected_len, &mut actions),
        Event::Completed(Completion::Transferred { len }) => {
            let mut ctx = TransferContext {
                state: TransferState::Transferred,
                ..ctx
            };
            let mut len = len;
            if len > expected_len {
                actions.push(Action::Truncated {
                    from: len,
                    to: expected_len,
                });
                len = expected_len;
            }

            if len < expected_len {
                ctx = count_error(ctx);
                actions.push(Action::DroppedShort {
                    len,
                    expected: expected_len,
                });
            } else {
                ctx.errors = 0;
                actions.push(Action::Deliver { len });
            }
            setup(ctx, expected_len, &mut actions)
        }
        Event::Completed(Completion::Failed(TransportError::Cancelled)) => {
            actions.push(Action::Stopped);
            TransferContext {
                state: TransferState::Error,
                running: false,
                ..ctx
            }
        }
        Event::Completed(Completion::Failed(_)) => {
            let ctx = count_error(TransferContext {
                state: TransferState::Error,
                ..ctx
            });
            actions.push(Action::ClearStall);
            setup(ctx, expected_len, &mut actions)
        }
    };

    Transition { next, actions }
}

/// Host-side interrupt pipe primitives.
///
/// The host reports each submission through
/// [`crate::driver::Wellspring::on_transfer_complete`], passing back the
/// [`TransferId`] it was submitted with. The driver never holds its lock
/// while calling these, so a host may report completions from inside them.
pub trait InterruptHost: Send {
    /// Queue an IN transfer of `len` bytes on `id.channel`'s endpoint.
    fn submit(&self, id: TransferId, len: usize) -> Result<()>;

    /// Clear a halted endpoint.
    fn clear_stall(&self, channel: Channel) -> Result<()>;

    /// Cancel any pending transfer; the host reports it as cancelled.
    fn stop_transfer(&self, channel: Channel);

    /// Change the polling interval of the channel's endpoint.
    fn set_interval(&self, channel: Channel, interval_ms: u32) -> Result<()>;
}
