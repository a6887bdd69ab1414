//! Control-pipe transport abstraction.
//!
//! Provides a trait-based transport layer so that real USB hosts and mock
//! devices share the same interface. Only the default control pipe goes
//! through here; interrupt transfers are driven by
//! [`crate::transfer::InterruptHost`].

use crate::error::Result;

/// bmRequestType: device-to-host, class, interface.
pub const UT_READ_CLASS_INTERFACE: u8 = 0xA1;
/// bmRequestType: host-to-device, class, interface.
pub const UT_WRITE_CLASS_INTERFACE: u8 = 0x21;
/// HID class GET_REPORT.
pub const UR_GET_REPORT: u8 = 0x01;
/// HID class SET_REPORT.
pub const UR_SET_REPORT: u8 = 0x09;
/// Size of an encoded setup packet.
pub const SETUP_PACKET_LEN: usize = 8;

/// A USB control request (setup stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlRequest {
    /// Build `wValue` from its high (type) and low (id) sub-bytes.
    pub const fn value_from_parts(hi: u8, lo: u8) -> u16 {
        ((hi as u16) << 8) | lo as u16
    }

    /// Whether the data stage flows device-to-host.
    pub fn is_read(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    /// Encode as the 8-byte little-endian setup packet.
    pub fn encode(&self) -> [u8; SETUP_PACKET_LEN] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Decode an 8-byte setup packet.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < SETUP_PACKET_LEN {
            return None;
        }
        Some(Self {
            request_type: data[0],
            request: data[1],
            value: u16::from_le_bytes([data[2], data[3]]),
            index: u16::from_le_bytes([data[4], data[5]]),
            length: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

/// Abstraction over the device's default control pipe.
///
/// Calls block until the device answers or the host times out. Any return
/// other than `Ok` means the request did not complete normally.
pub trait ControlTransport: Send {
    /// Issue a request with a device-to-host data stage; returns bytes read.
    fn control_in(&self, req: &ControlRequest, buf: &mut [u8]) -> Result<usize>;

    /// Issue a request with a host-to-device data stage.
    fn control_out(&self, req: &ControlRequest, data: &[u8]) -> Result<()>;

    /// Submit one control transfer whose frames are given as separate buffer
    /// segments: the encoded setup packet first, then the data stage.
    fn control_segments(&self, segments: &[&[u8]]) -> Result<()>;
}
