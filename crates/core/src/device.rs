//! Device identification and discovery.

use crate::error::{Error, Result};
use crate::profile::Variant;
use crate::APPLE_VID;
use tracing::{debug, info};

/// Product ids (ANSI, ISO, JIS) per variant.
const PRODUCT_TABLE: &[(u16, Variant)] = &[
    // MacBook Air 1.1
    (0x0223, Variant::Wellspring),
    (0x0224, Variant::Wellspring),
    (0x0225, Variant::Wellspring),
    // MacBook Pro Penryn
    (0x0230, Variant::Wellspring2),
    (0x0231, Variant::Wellspring2),
    (0x0232, Variant::Wellspring2),
    // MacBook 5,1
    (0x0236, Variant::Wellspring3),
    (0x0237, Variant::Wellspring3),
    (0x0238, Variant::Wellspring3),
    // MacBook Air 3.2
    (0x023F, Variant::Wellspring4),
    (0x0240, Variant::Wellspring4),
    (0x0241, Variant::Wellspring4),
    // MacBook Air 3.1
    (0x0242, Variant::Wellspring4a),
    (0x0243, Variant::Wellspring4a),
    (0x0244, Variant::Wellspring4a),
    // MacBook Pro 8,1
    (0x0245, Variant::Wellspring5),
    (0x0246, Variant::Wellspring5),
    (0x0247, Variant::Wellspring5),
    // MacBook Pro 8,2
    (0x0252, Variant::Wellspring5a),
    (0x0253, Variant::Wellspring5a),
    (0x0254, Variant::Wellspring5a),
    // MacBook Air 4.1
    (0x0249, Variant::Wellspring6),
    (0x024A, Variant::Wellspring6),
    (0x024B, Variant::Wellspring6),
    // MacBook Air 4.2
    (0x024C, Variant::Wellspring6a),
    (0x024D, Variant::Wellspring6a),
    (0x024E, Variant::Wellspring6a),
];

/// Resolve the variant of a USB device, if it is a supported trackpad.
pub fn variant_for(vid: u16, pid: u16) -> Option<Variant> {
    if vid != APPLE_VID {
        return None;
    }
    PRODUCT_TABLE
        .iter()
        .find(|(p, _)| *p == pid)
        .map(|(_, v)| *v)
}

/// Product ids registered for a variant.
pub fn product_ids(variant: Variant) -> impl Iterator<Item = u16> {
    PRODUCT_TABLE
        .iter()
        .filter(move |(_, v)| *v == variant)
        .map(|(p, _)| *p)
}

/// Information about a discovered trackpad.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub variant: Variant,
    pub vid: u16,
    pub pid: u16,
    pub interface: i32,
    pub path: String,
    pub serial: Option<String>,
}

/// Discover all connected Wellspring trackpads.
///
/// Every HID interface of a matching product is returned; the caller picks
/// the multi-touch one by `interface`.
pub fn discover_devices() -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let mut devices = Vec::new();
    for info in api.device_list() {
        let Some(variant) = variant_for(info.vendor_id(), info.product_id()) else {
            continue;
        };
        info!(
            variant = %variant,
            vid = format_args!("0x{:04X}", info.vendor_id()),
            pid = format_args!("0x{:04X}", info.product_id()),
            interface = info.interface_number(),
            path = %info.path().to_string_lossy(),
            "Found Wellspring trackpad"
        );
        devices.push(DeviceInfo {
            variant,
            vid: info.vendor_id(),
            pid: info.product_id(),
            interface: info.interface_number(),
            path: info.path().to_string_lossy().into_owned(),
            serial: info.serial_number().map(|s| s.to_string()),
        });
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}
