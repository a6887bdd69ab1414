//! Packet validation and calibration mapping.
//!
//! Trackpad frame layout:
//!   - header: 26 bytes (Type1) or 30 bytes (Type2)
//!   - 16 finger records of 28 bytes each
//!
//! Button frame layout (4 bytes): `[unknown, button, rel_x, rel_y]`.
//!
//! Raw axis values are clamped into the profile's calibration range and
//! jitter-filtered per finger slot. Resolutions are passed through unscaled;
//! unit conversion belongs to the consumer.

use crate::profile::{DeviceProfile, FINGER_RECORDS, FINGER_RECORD_LEN};
use crate::transfer::Channel;
use serde::Serialize;

/// Byte offset of the integrated button state in a Type2 header.
pub const HEADER_BUTTON_OFFSET: usize = 15;
/// Byte offset of the button state in a button-channel frame.
pub const BUTTON_FRAME_STATE_OFFSET: usize = 1;

/// Offsets of the fields used from a 28-byte finger record.
///
/// Each record is fourteen little-endian `i16` words: origin, abs_x, abs_y,
/// rel_x, rel_y, tool_major, tool_minor, orientation, touch_major,
/// touch_minor, two unused words, pressure, multi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerLayout {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub orientation: usize,
    pub pressure: usize,
}

impl FingerLayout {
    pub const WELLSPRING: FingerLayout = FingerLayout {
        x: 2,
        y: 4,
        width: 16,
        orientation: 14,
        pressure: 24,
    };
}

/// A completed transfer, borrowed for the duration of decoding.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub channel: Channel,
    pub data: &'a [u8],
}

/// Why a frame was not turned into a [`NormalizedFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Length {
        channel: Channel,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Length {
                channel,
                expected,
                actual,
            } => write!(f, "{channel} frame is {actual} bytes, expected {expected}"),
        }
    }
}

/// One calibrated touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Touch {
    /// Record position within the frame, 0..16.
    pub slot: u8,
    pub x: i32,
    pub y: i32,
    pub pressure: i32,
    pub width: i32,
    /// Raw, uncalibrated.
    pub orientation: i32,
}

/// Counts per physical unit of each axis, as configured in the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisResolution {
    pub pressure: i32,
    pub width: i32,
    pub x: i32,
    pub y: i32,
}

impl AxisResolution {
    pub fn of(profile: &DeviceProfile) -> Self {
        Self {
            pressure: profile.pressure.resolution,
            width: profile.width.resolution,
            x: profile.x.resolution,
            y: profile.y.resolution,
        }
    }
}

/// A decoded, calibrated frame ready for the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedFrame {
    pub channel: Channel,
    pub button: bool,
    pub touches: Vec<Touch>,
    pub resolution: AxisResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotState {
    x: i32,
    y: i32,
    pressure: i32,
    width: i32,
}

fn read_i16(record: &[u8], offset: usize) -> i32 {
    i16::from_le_bytes([record[offset], record[offset + 1]]) as i32
}

/// Validates frames against a profile and maps them to calibrated values.
///
/// Keeps the last reported values of each finger slot for jitter
/// suppression; a slot that lifts forgets its history.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    profile: &'static DeviceProfile,
    layout: FingerLayout,
    slots: [Option<SlotState>; FINGER_RECORDS],
}

impl FrameDecoder {
    pub fn new(profile: &'static DeviceProfile) -> Self {
        Self {
            profile,
            layout: FingerLayout::WELLSPRING,
            slots: [None; FINGER_RECORDS],
        }
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    /// Forget all per-slot history.
    pub fn reset(&mut self) {
        self.slots = [None; FINGER_RECORDS];
    }

    /// Validate and decode one frame.
    pub fn validate(&mut self, frame: &RawFrame<'_>) -> Result<NormalizedFrame, DropReason> {
        let expected = frame.channel.expected_len(self.profile);
        if frame.data.len() != expected {
            return Err(DropReason::Length {
                channel: frame.channel,
                expected,
                actual: frame.data.len(),
            });
        }

        let resolution = AxisResolution::of(self.profile);
        match frame.channel {
            Channel::Button => Ok(NormalizedFrame {
                channel: Channel::Button,
                button: frame.data[BUTTON_FRAME_STATE_OFFSET] != 0,
                touches: Vec::new(),
                resolution,
            }),
            Channel::Trackpad => Ok(NormalizedFrame {
                channel: Channel::Trackpad,
                button: self.header_button(frame.data),
                touches: self.map_fingers(&frame.data[self.profile.header_len()..]),
                resolution,
            }),
        }
    }

    fn header_button(&self, data: &[u8]) -> bool {
        self.profile.has_integrated_button() && data[HEADER_BUTTON_OFFSET] != 0
    }

    fn map_fingers(&mut self, payload: &[u8]) -> Vec<Touch> {
        let p = self.profile;
        let layout = self.layout;
        let mut touches = Vec::new();

        for (slot, record) in payload.chunks_exact(FINGER_RECORD_LEN).enumerate() {
            let raw_width = read_i16(record, layout.width);
            if raw_width <= 0 {
                self.slots[slot] = None;
                continue;
            }

            let current = SlotState {
                x: p.x.clamp(read_i16(record, layout.x)),
                y: p.y.clamp(read_i16(record, layout.y)),
                pressure: p.pressure.clamp(read_i16(record, layout.pressure)),
                width: p.width.clamp(raw_width),
            };
            let filtered = match self.slots[slot] {
                Some(prev) => SlotState {
                    x: p.x.filter(prev.x, current.x),
                    y: p.y.filter(prev.y, current.y),
                    pressure: p.pressure.filter(prev.pressure, current.pressure),
                    width: p.width.filter(prev.width, current.width),
                },
                None => current,
            };
            self.slots[slot] = Some(filtered);

            touches.push(Touch {
                slot: slot as u8,
                x: filtered.x,
                y: filtered.y,
                pressure: filtered.pressure,
                width: filtered.width,
                orientation: read_i16(record, layout.orientation),
            });
        }

        touches
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{trackpad_frame, Finger};
    use super::*;
    use crate::profile::{lookup, Variant};

    fn decoder(variant: Variant) -> FrameDecoder {
        FrameDecoder::new(lookup(variant).unwrap())
    }

    fn finger(x: i16, y: i16) -> Finger {
        Finger {
            x,
            y,
            pressure: 40,
            width: 300,
            orientation: 16384,
        }
    }

    #[test]
    fn decodes_touch_at_record_offsets() {
        let mut d = decoder(Variant::Wellspring3);
        let data = trackpad_frame(d.profile(), false, &[finger(100, 200)]);
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &data,
            })
            .unwrap();
        assert_eq!(frame.touches.len(), 1);
        let t = frame.touches[0];
        assert_eq!((t.slot, t.x, t.y, t.pressure, t.width), (0, 100, 200, 40, 300));
        assert_eq!(t.orientation, 16384);
        assert!(!frame.button);
        assert_eq!(frame.resolution.x, 1280);
        assert_eq!(frame.resolution.y, 800);
    }

    #[test]
    fn empty_records_are_not_touches() {
        let mut d = decoder(Variant::Wellspring);
        let data = trackpad_frame(d.profile(), false, &[]);
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &data,
            })
            .unwrap();
        assert!(frame.touches.is_empty());
    }

    #[test]
    fn negative_width_is_not_a_touch() {
        let mut d = decoder(Variant::Wellspring5);
        let lifted = Finger {
            width: -3,
            ..finger(100, 200)
        };
        let data = trackpad_frame(d.profile(), false, &[lifted, finger(300, 400)]);
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &data,
            })
            .unwrap();
        assert_eq!(frame.touches.len(), 1);
        assert_eq!((frame.touches[0].slot, frame.touches[0].x), (1, 300));
    }

    #[test]
    fn values_are_clamped_to_calibration_range() {
        let mut d = decoder(Variant::Wellspring2);
        let f = Finger {
            x: i16::MAX,
            y: i16::MIN,
            pressure: 1000,
            width: 4000,
            orientation: 0,
        };
        let data = trackpad_frame(d.profile(), false, &[f]);
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &data,
            })
            .unwrap();
        let t = frame.touches[0];
        assert_eq!(t.x, 4824);
        assert_eq!(t.y, -172);
        assert_eq!(t.pressure, 256);
        assert_eq!(t.width, 2048);
    }

    #[test]
    fn jitter_below_noise_is_suppressed_per_slot() {
        let mut d = decoder(Variant::Wellspring4);
        let first = trackpad_frame(d.profile(), false, &[finger(1000, 1000)]);
        let jitter = trackpad_frame(d.profile(), false, &[finger(1004, 997)]);
        let moved = trackpad_frame(d.profile(), false, &[finger(1010, 1000)]);

        fn decode(d: &mut FrameDecoder, data: &[u8]) -> Touch {
            d.validate(&RawFrame {
                channel: Channel::Trackpad,
                data,
            })
            .unwrap()
            .touches[0]
        }
        assert_eq!(decode(&mut d, &first).x, 1000);
        let t = decode(&mut d, &jitter);
        assert_eq!((t.x, t.y), (1000, 1000));
        assert_eq!(decode(&mut d, &moved).x, 1010);
    }

    #[test]
    fn lifted_slot_forgets_history() {
        let mut d = decoder(Variant::Wellspring4);
        let touch = trackpad_frame(d.profile(), false, &[finger(1000, 1000)]);
        let lifted = trackpad_frame(d.profile(), false, &[]);
        let near = trackpad_frame(d.profile(), false, &[finger(1002, 1000)]);
        for data in [&touch, &lifted] {
            d.validate(&RawFrame {
                channel: Channel::Trackpad,
                data,
            })
            .unwrap();
        }
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &near,
            })
            .unwrap();
        assert_eq!(frame.touches[0].x, 1002);
    }

    #[test]
    fn integrated_button_read_from_header() {
        let mut d = decoder(Variant::Wellspring5);
        let data = trackpad_frame(d.profile(), true, &[]);
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &data,
            })
            .unwrap();
        assert!(frame.button);
    }

    #[test]
    fn button_channel_frame() {
        let mut d = decoder(Variant::Wellspring);
        let frame = d
            .validate(&RawFrame {
                channel: Channel::Button,
                data: &[0x00, 0x01, 0x00, 0x00],
            })
            .unwrap();
        assert_eq!(frame.channel, Channel::Button);
        assert!(frame.button);
        assert!(frame.touches.is_empty());
    }

    #[test]
    fn wrong_length_is_dropped() {
        let mut d = decoder(Variant::Wellspring6);
        let data = vec![0u8; 100];
        let err = d
            .validate(&RawFrame {
                channel: Channel::Trackpad,
                data: &data,
            })
            .unwrap_err();
        assert_eq!(
            err,
            DropReason::Length {
                channel: Channel::Trackpad,
                expected: 478,
                actual: 100
            }
        );
    }
}
