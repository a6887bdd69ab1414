//! Caller-side error classification and retry.
//!
//! The mode negotiator never retries on its own. Callers that want to ride
//! out transient control-pipe failures wrap the call in [`with_retry`].

use crate::error::{Error, Result};
use crate::mode::{self, ModeState};
use crate::transport::ControlTransport;
use tracing::{debug, warn};

/// Maximum retry attempts for transient errors.
pub const MAX_RETRIES: u32 = 3;

/// Classification of communication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on retry (timeout, busy endpoint).
    Transient,
    /// Device is gone; stop retrying.
    Disconnected,
    /// Permission denied opening or talking to the device.
    PermissionDenied,
    /// Caller error or device rejected the request.
    Protocol,
    /// Local resource or configuration problem.
    Local,
}

impl ErrorClass {
    /// Classify an error for retry decisions.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Timeout(_) => Self::Transient,
            Error::DeviceNotFound(_) => Self::Disconnected,
            Error::InvalidMode(_) | Error::UnknownVariant(_) => Self::Protocol,
            Error::Busy(_)
            | Error::NotOpen
            | Error::ResourceExhausted { .. }
            | Error::Config(_) => Self::Local,
            Error::Hid(msg) | Error::DeviceComm { reason: msg, .. } => classify_message(msg),
        }
    }

    /// Whether this error class is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

fn classify_message(msg: &str) -> ErrorClass {
    let lower = msg.to_lowercase();
    if lower.contains("disconnect") || lower.contains("no such device") {
        ErrorClass::Disconnected
    } else if lower.contains("permission") || lower.contains("access denied") {
        ErrorClass::PermissionDenied
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("stall")
        || lower.contains("busy")
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Protocol
    }
}

/// Run `op` again while it fails with a transient error, up to `max_retries`
/// extra attempts.
pub fn with_retry<T>(max_retries: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => {
                if attempt > 0 {
                    debug!("request succeeded on attempt {}", attempt + 1);
                }
                return Ok(v);
            }
            Err(e) => {
                let class = ErrorClass::classify(&e);
                if !class.is_retryable() || attempt == max_retries {
                    warn!(
                        "request failed (class={:?}, attempt={}/{}): {}",
                        class,
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }
                debug!(
                    "transient error (attempt {}/{}): {}, retrying...",
                    attempt + 1,
                    max_retries + 1,
                    e
                );
                attempt += 1;
            }
        }
    }
}

/// Device connection status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    PermissionError,
    Error,
}

/// Check connectivity by reading the mode report.
pub fn check_device_status(transport: &dyn ControlTransport) -> DeviceStatus {
    let mut state = ModeState::new();
    match mode::query_mode(transport, &mut state) {
        Ok(_) => DeviceStatus::Connected,
        Err(ref e) => match ErrorClass::classify(e) {
            ErrorClass::Disconnected => DeviceStatus::Disconnected,
            ErrorClass::PermissionDenied => DeviceStatus::PermissionError,
            _ => DeviceStatus::Error,
        },
    }
}
