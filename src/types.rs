//! Core types for accel-datalog
//!
//! This module defines the data that flows from the accelerometer feed to the
//! logging transport: raw samples, fixed-size wire records, and the small
//! vocabulary of recording states and control events.

use crate::error::DatalogError;
use serde::{Deserialize, Serialize};

/// Size in bytes of every record written to a logging session
pub const RECORD_SIZE: usize = 6;

/// Bit 7 of byte 0: set for anchors, clear for readings
pub const TAG_BIT: u8 = 0x80;

/// One triaxial accelerometer sample as delivered by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// X acceleration (mG)
    pub x: i16,
    /// Y acceleration (mG)
    pub y: i16,
    /// Z acceleration (mG)
    pub z: i16,
    /// Capture time in ms since the UNIX epoch
    pub capture_time: i64,
}

impl Sample {
    pub fn new(x: i16, y: i16, z: i16, capture_time: i64) -> Self {
        Self {
            x,
            y,
            z,
            capture_time,
        }
    }
}

/// Record classification carried by the tag bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Reading,
    Anchor,
}

/// A fixed 6-byte unit written to the logging session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Record([u8; RECORD_SIZE]);

impl Record {
    pub fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.0
    }

    pub fn kind(&self) -> RecordKind {
        if self.0[0] & TAG_BIT != 0 {
            RecordKind::Anchor
        } else {
            RecordKind::Reading
        }
    }

    pub fn is_anchor(&self) -> bool {
        self.kind() == RecordKind::Anchor
    }
}

/// Accelerometer sampling rates supported by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum SamplingRate {
    #[default]
    Hz10,
    Hz25,
    Hz50,
    Hz100,
}

impl SamplingRate {
    pub fn hz(&self) -> u16 {
        match self {
            SamplingRate::Hz10 => 10,
            SamplingRate::Hz25 => 25,
            SamplingRate::Hz50 => 50,
            SamplingRate::Hz100 => 100,
        }
    }

    /// Nominal spacing between consecutive samples
    pub fn period_ms(&self) -> u64 {
        1000 / u64::from(self.hz())
    }
}

impl TryFrom<u16> for SamplingRate {
    type Error = DatalogError;

    fn try_from(hz: u16) -> Result<Self, Self::Error> {
        match hz {
            10 => Ok(SamplingRate::Hz10),
            25 => Ok(SamplingRate::Hz25),
            50 => Ok(SamplingRate::Hz50),
            100 => Ok(SamplingRate::Hz100),
            other => Err(DatalogError::InvalidConfig(format!(
                "unsupported sampling rate {other} Hz (expected 10, 25, 50 or 100)"
            ))),
        }
    }
}

impl From<SamplingRate> for u16 {
    fn from(rate: SamplingRate) -> Self {
        rate.hz()
    }
}

/// Where the device is worn. The menu index doubles as the session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyLocation {
    DominantWrist,
    NonDominantWrist,
    Waist,
    RightAnkle,
    LeftAnkle,
    UpperDominantArm,
    UpperNonDominantArm,
    RightThigh,
    LeftThigh,
    Chest,
    Neck,
}

impl BodyLocation {
    /// All locations in menu order
    pub const ALL: [BodyLocation; 11] = [
        BodyLocation::DominantWrist,
        BodyLocation::NonDominantWrist,
        BodyLocation::Waist,
        BodyLocation::RightAnkle,
        BodyLocation::LeftAnkle,
        BodyLocation::UpperDominantArm,
        BodyLocation::UpperNonDominantArm,
        BodyLocation::RightThigh,
        BodyLocation::LeftThigh,
        BodyLocation::Chest,
        BodyLocation::Neck,
    ];

    pub fn session_id(&self) -> u8 {
        match self {
            BodyLocation::DominantWrist => 0,
            BodyLocation::NonDominantWrist => 1,
            BodyLocation::Waist => 2,
            BodyLocation::RightAnkle => 3,
            BodyLocation::LeftAnkle => 4,
            BodyLocation::UpperDominantArm => 5,
            BodyLocation::UpperNonDominantArm => 6,
            BodyLocation::RightThigh => 7,
            BodyLocation::LeftThigh => 8,
            BodyLocation::Chest => 9,
            BodyLocation::Neck => 10,
        }
    }

    pub fn from_session_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Menu title shown on the device
    pub fn title(&self) -> &'static str {
        match self {
            BodyLocation::DominantWrist => "Dominant Wrist",
            BodyLocation::NonDominantWrist => "Non-Dominant Wrist",
            BodyLocation::Waist => "Waist",
            BodyLocation::RightAnkle => "Right Ankle",
            BodyLocation::LeftAnkle => "Left Ankle",
            BodyLocation::UpperDominantArm => "Upper Dominant Arm",
            BodyLocation::UpperNonDominantArm => "Upper Non-Dominant Arm",
            BodyLocation::RightThigh => "Right Thigh",
            BodyLocation::LeftThigh => "Left Thigh",
            BodyLocation::Chest => "Chest",
            BodyLocation::Neck => "Neck",
        }
    }
}

/// Recording state owned by the sampling controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Stopped => "stopped",
        }
    }
}

/// Transition request raised by the button dispatcher or the app lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlEvent {
    Start,
    Pause,
    Resume,
    Stop,
    Flush,
}

/// Physical buttons on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Up,
    Select,
    Down,
    Back,
}

/// A button click as reported by the input dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    Short(Button),
    Long(Button),
}
