//! wellspring-core: mode negotiation, interrupt transfer handling, and
//! multi-touch frame decoding for Apple Wellspring USB trackpads.
//!
//! The driver is host-agnostic: a USB host supplies control requests and
//! interrupt pipes through [`transport::ControlTransport`] and
//! [`transfer::InterruptHost`], and reports transfer completions back to
//! [`driver::Wellspring::on_transfer_complete`].

pub mod comm;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod frame;
#[cfg(test)]
mod integration_tests;
pub mod mode;
pub mod profile;
pub mod sink;
pub mod transfer;
pub mod transport;

/// Apple USB Vendor ID.
pub const APPLE_VID: u16 = 0x05AC;
