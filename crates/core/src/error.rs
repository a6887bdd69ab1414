//! Error types for wellspring-core.

use thiserror::Error;

/// Core library error type.
///
/// Conditions the transfer state machine recovers from on its own (stalls,
/// short or oversize packets) never show up here; see
/// [`crate::transfer::TransportError`] and [`crate::frame::DropReason`].
#[derive(Debug, Error)]
pub enum Error {
    /// HID host failure (hidapi or similar).
    #[error("HID error: {0}")]
    Hid(String),

    /// A control request to the device did not complete normally.
    #[error("device communication failed during {op}: {reason}")]
    DeviceComm { op: &'static str, reason: String },

    /// Requested mode is neither raw-sensor nor HID; rejected before any I/O.
    #[error("invalid interface mode 0x{0:02X}")]
    InvalidMode(u8),

    /// Variant tag has no entry in the profile registry.
    #[error("unknown device variant: {0}")]
    UnknownVariant(String),

    /// Device not found during enumeration.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Channel is already enabled.
    #[error("device busy: {0}")]
    Busy(&'static str),

    /// Channel has not been opened.
    #[error("device not open")]
    NotOpen,

    /// Frame buffer allocation failed.
    #[error("resource exhausted: could not allocate {requested} frame slots")]
    ResourceExhausted { requested: usize },

    /// Invalid driver configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Shorthand for a [`Error::DeviceComm`] failure.
    pub fn comm(op: &'static str, reason: impl Into<String>) -> Self {
        Self::DeviceComm {
            op,
            reason: reason.into(),
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
