//! Device mode negotiation over HID class GET_REPORT / SET_REPORT.
//!
//! The trackpad powers up in HID mode, where it emits vendor-abstracted
//! reports. Multi-touch decoding needs raw-sensor mode. Both are selected by
//! byte 0 of an 8-byte feature report (type 0x03, id 0x00):
//!   - GET_REPORT wValue=0x0300 wIndex=0 wLength=8 → current mode bytes
//!   - SET_REPORT wValue=0x0300 wIndex=0 wLength=8 ← mode bytes
//!
//! Nothing here retries; callers decide (see [`crate::comm::with_retry`]).

use crate::error::{Error, Result};
use crate::transport::{
    ControlRequest, ControlTransport, UR_GET_REPORT, UR_SET_REPORT, UT_READ_CLASS_INTERFACE,
    UT_WRITE_CLASS_INTERFACE,
};
use tracing::{debug, error, trace};

/// Length of the mode report.
pub const MODE_LEN: usize = 8;
/// Feature report type.
pub const REPORT_TYPE_FEATURE: u8 = 0x03;
/// Mode report id.
pub const MODE_REPORT_ID: u8 = 0x00;

/// Device interface mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InterfaceMode {
    /// Unprocessed per-finger sensor telemetry.
    RawSensor = 0x01,
    /// Pre-processed vendor HID reports.
    Hid = 0x08,
}

impl InterfaceMode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::RawSensor),
            0x08 => Some(Self::Hid),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RawSensor => write!(f, "raw-sensor"),
            Self::Hid => write!(f, "hid"),
        }
    }
}

/// Mode buffer and the logical mode last observed or set.
///
/// `mode` is `None` when unknown: before the first query, after a failed
/// switch, or when the device reports a byte that is not a known mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeState {
    pub bytes: [u8; MODE_LEN],
    pub mode: Option<InterfaceMode>,
}

impl ModeState {
    pub fn new() -> Self {
        Self::default()
    }
}

fn mode_request(request_type: u8, request: u8) -> ControlRequest {
    ControlRequest {
        request_type,
        request,
        value: ControlRequest::value_from_parts(REPORT_TYPE_FEATURE, MODE_REPORT_ID),
        index: 0,
        length: MODE_LEN as u16,
    }
}

/// Read the 8-byte mode report into `state`.
pub fn query_mode(transport: &dyn ControlTransport, state: &mut ModeState) -> Result<[u8; MODE_LEN]> {
    let req = mode_request(UT_READ_CLASS_INTERFACE, UR_GET_REPORT);
    let mut buf = [0u8; MODE_LEN];

    let n = transport
        .control_in(&req, &mut buf)
        .map_err(|e| Error::comm("get mode", e.to_string()))?;
    if n < MODE_LEN {
        return Err(Error::comm(
            "get mode",
            format!("short mode report: {n} of {MODE_LEN} bytes"),
        ));
    }

    state.bytes = buf;
    state.mode = InterfaceMode::from_byte(buf[0]);
    trace!(mode_hex = format_args!("{:02X?}", buf), "mode report RX");
    Ok(buf)
}

/// Write `mode` into byte 0 of the mode buffer and send it to the device.
///
/// Any byte other than raw-sensor (0x01) or HID (0x08) is rejected before a
/// request is issued.
pub fn set_mode(transport: &dyn ControlTransport, state: &mut ModeState, mode: u8) -> Result<()> {
    let mode = InterfaceMode::from_byte(mode).ok_or(Error::InvalidMode(mode))?;

    state.bytes[0] = mode.as_byte();
    let req = mode_request(UT_WRITE_CLASS_INTERFACE, UR_SET_REPORT);
    trace!(mode_hex = format_args!("{:02X?}", state.bytes), "mode report TX");

    match transport.control_out(&req, &state.bytes) {
        Ok(()) => {
            state.mode = Some(mode);
            Ok(())
        }
        Err(e) => {
            state.mode = None;
            Err(Error::comm("set mode", e.to_string()))
        }
    }
}

/// Full mode switch: clear the buffer, read the current mode, then set `mode`.
///
/// The read is diagnostic but still required; if it fails the switch is
/// abandoned.
pub fn switch_mode(
    transport: &dyn ControlTransport,
    state: &mut ModeState,
    mode: InterfaceMode,
) -> Result<()> {
    state.bytes = [0u8; MODE_LEN];

    debug!("reading sensor mode");
    let current = query_mode(transport, state).map_err(|e| {
        error!(error = %e, "failed to read device mode");
        e
    })?;
    debug!(
        current = format_args!("0x{:016X}", u64::from_le_bytes(current)),
        target_mode = %mode,
        "switching sensor mode"
    );

    set_mode(transport, state, mode.as_byte()).map_err(|e| {
        error!(error = %e, target_mode = %mode, "failed to set device mode");
        e
    })
}

/// Switch the device into raw-sensor mode.
pub fn reset_to_raw_sensor(transport: &dyn ControlTransport, state: &mut ModeState) -> Result<()> {
    switch_mode(transport, state, InterfaceMode::RawSensor)
}

/// Attach-time reset: one SET_REPORT transfer split over two segments, the
/// setup packet and the 8-byte raw-sensor payload.
pub fn attach_reset(transport: &dyn ControlTransport, state: &mut ModeState) -> Result<()> {
    state.bytes[0] = InterfaceMode::RawSensor.as_byte();
    let setup = mode_request(UT_WRITE_CLASS_INTERFACE, UR_SET_REPORT).encode();

    debug!("attach reset to raw sensor mode");
    match transport.control_segments(&[&setup, &state.bytes]) {
        Ok(()) => {
            state.mode = Some(InterfaceMode::RawSensor);
            Ok(())
        }
        Err(e) => {
            state.mode = None;
            Err(Error::comm("attach reset", e.to_string()))
        }
    }
}
