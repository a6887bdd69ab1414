//! Per-variant device profile registry.
//!
//! Every Wellspring generation shares the same driver logic; what differs is
//! data: header size, whether the button is integrated into the pad, and the
//! calibration ranges of the four measured axes. The table is immutable and
//! lives for the whole process.

use crate::error::{Error, Result};
use serde::Serialize;

/// Button channel frame length, identical across all known variants.
pub const BUTTON_FRAME_LEN: usize = 4;
/// Size of one finger record inside a trackpad frame.
pub const FINGER_RECORD_LEN: usize = 28;
/// Number of finger records in every trackpad frame.
pub const FINGER_RECORDS: usize = 16;
/// Total finger payload (16 x 28 bytes).
pub const FINGER_PAYLOAD_LEN: usize = FINGER_RECORD_LEN * FINGER_RECORDS;

/// Hardware variant tag, resolved by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Variant {
    Wellspring,
    Wellspring2,
    Wellspring3,
    Wellspring4,
    Wellspring4a,
    Wellspring5,
    Wellspring5a,
    Wellspring6,
    Wellspring6a,
}

impl Variant {
    /// All known variants, in table order.
    pub const ALL: &'static [Variant] = &[
        Variant::Wellspring,
        Variant::Wellspring2,
        Variant::Wellspring3,
        Variant::Wellspring4,
        Variant::Wellspring4a,
        Variant::Wellspring5,
        Variant::Wellspring5a,
        Variant::Wellspring6,
        Variant::Wellspring6a,
    ];

    /// Parse a variant from a CLI-friendly name (`"wellspring4a"`, `"4a"`).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let suffix = lower.strip_prefix("wellspring").unwrap_or(lower.as_str());
        match suffix.trim_start_matches(['-', '_', ' ']) {
            "" | "1" => Some(Self::Wellspring),
            "2" => Some(Self::Wellspring2),
            "3" => Some(Self::Wellspring3),
            "4" => Some(Self::Wellspring4),
            "4a" => Some(Self::Wellspring4a),
            "5" => Some(Self::Wellspring5),
            "5a" => Some(Self::Wellspring5a),
            "6" => Some(Self::Wellspring6),
            "6a" => Some(Self::Wellspring6a),
            _ => None,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Frame header generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Generation {
    /// Wellspring and Wellspring 2: 26-byte header.
    Type1,
    /// Wellspring 3 and later: 30-byte header.
    Type2,
}

impl Generation {
    /// Header length preceding the finger records.
    pub const fn header_len(self) -> usize {
        match self {
            Self::Type1 => 26,
            Self::Type2 => 30,
        }
    }
}

/// Feature flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Features(u32);

impl Features {
    pub const NONE: Features = Features(0);
    /// The physical button is part of the pad and reported in the trackpad header.
    pub const INTEGRATED_BUTTON: Features = Features(0x1);

    pub const fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Calibration of one raw measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalibrationAxis {
    /// Counts per physical unit, always > 0.
    pub resolution: i32,
    /// Smallest raw delta considered real motion.
    pub noise: i32,
    pub min: i32,
    pub max: i32,
}

impl CalibrationAxis {
    pub const fn new(resolution: i32, noise: i32, min: i32, max: i32) -> Self {
        Self {
            resolution,
            noise,
            min,
            max,
        }
    }

    /// Clamp a raw reading into `[min, max]`.
    pub fn clamp(&self, raw: i32) -> i32 {
        raw.clamp(self.min, self.max)
    }

    /// Suppress jitter: a change smaller than `noise` keeps the previous value.
    pub fn filter(&self, previous: i32, current: i32) -> i32 {
        if (current - previous).abs() < self.noise {
            previous
        } else {
            current
        }
    }

    /// `min < max`, `resolution > 0`, `noise >= 0`.
    pub fn is_valid(&self) -> bool {
        self.min < self.max && self.resolution > 0 && self.noise >= 0
    }
}

/// Immutable per-variant constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub variant: Variant,
    pub features: Features,
    pub name: &'static str,
    pub generation: Generation,
    pub button_frame_len: usize,
    pub trackpad_frame_len: usize,
    pub pressure: CalibrationAxis,
    pub width: CalibrationAxis,
    pub x: CalibrationAxis,
    pub y: CalibrationAxis,
}

impl DeviceProfile {
    /// Header length for this profile's generation.
    pub fn header_len(&self) -> usize {
        self.generation.header_len()
    }

    pub fn has_integrated_button(&self) -> bool {
        self.features.contains(Features::INTEGRATED_BUTTON)
    }
}

const RES_PRESSURE: i32 = 256;
const RES_WIDTH: i32 = 16;
const RES_X: i32 = 1280;
const RES_Y: i32 = 800;
const NOISE_PRESSURE: i32 = 6;
const NOISE_WIDTH: i32 = 1;
const NOISE_X: i32 = 5;

const fn profile(
    variant: Variant,
    name: &'static str,
    generation: Generation,
    pressure_max: i32,
    x: (i32, i32),
    y: (i32, i32),
) -> DeviceProfile {
    let features = match generation {
        Generation::Type1 => Features::NONE,
        Generation::Type2 => Features::INTEGRATED_BUTTON,
    };
    DeviceProfile {
        variant,
        features,
        name,
        generation,
        button_frame_len: BUTTON_FRAME_LEN,
        trackpad_frame_len: generation.header_len() + FINGER_PAYLOAD_LEN,
        pressure: CalibrationAxis::new(RES_PRESSURE, NOISE_PRESSURE, 0, pressure_max),
        width: CalibrationAxis::new(RES_WIDTH, NOISE_WIDTH, 0, 2048),
        x: CalibrationAxis::new(RES_X, NOISE_X, x.0, x.1),
        // y shares the x noise threshold
        y: CalibrationAxis::new(RES_Y, NOISE_X, y.0, y.1),
    }
}

static PROFILES: [DeviceProfile; 9] = [
    profile(
        Variant::Wellspring,
        "Wellspring",
        Generation::Type1,
        256,
        (-4824, 5324),
        (-172, 5820),
    ),
    profile(
        Variant::Wellspring2,
        "Wellspring 2",
        Generation::Type1,
        256,
        (-4824, 4824),
        (-172, 4290),
    ),
    profile(
        Variant::Wellspring3,
        "Wellspring 3",
        Generation::Type2,
        300,
        (-4460, 5166),
        (-75, 6700),
    ),
    profile(
        Variant::Wellspring4,
        "Wellspring 4",
        Generation::Type2,
        300,
        (-4620, 5140),
        (-150, 6600),
    ),
    profile(
        Variant::Wellspring4a,
        "Wellspring 4a",
        Generation::Type2,
        300,
        (-4616, 5112),
        (-142, 5234),
    ),
    profile(
        Variant::Wellspring5,
        "Wellspring 5",
        Generation::Type2,
        300,
        (-4415, 5050),
        (-55, 6680),
    ),
    profile(
        Variant::Wellspring5a,
        "Wellspring 5a",
        Generation::Type2,
        300,
        (-4750, 5280),
        (-150, 6730),
    ),
    profile(
        Variant::Wellspring6,
        "Wellspring 6",
        Generation::Type2,
        300,
        (-4620, 5140),
        (-150, 6600),
    ),
    profile(
        Variant::Wellspring6a,
        "Wellspring 6a",
        Generation::Type2,
        300,
        (-4620, 5140),
        (-150, 6600),
    ),
];

/// All registered profiles.
pub fn profiles() -> &'static [DeviceProfile] {
    &PROFILES
}

/// Look up the profile for a variant.
pub fn lookup(variant: Variant) -> Result<&'static DeviceProfile> {
    PROFILES
        .iter()
        .find(|p| p.variant == variant)
        .ok_or_else(|| Error::UnknownVariant(variant.to_string()))
}
