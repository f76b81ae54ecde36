//! # Signal Kind Definitions Module
//!
//! The five physiological streams the device can record, with their fixed
//! per-kind properties and the typed sample structs producers submit.
//!
//! ## Key Types
//! - `SignalKind`: enum over the five streams (PPG wrist/finger, IMU
//!   accel/gyro, GSR)
//! - `SignalMask`: 5-bit set of enabled kinds for a session
//! - Per-kind sample structs (`PpgWristSample`, `ImuSample`, ...) with
//!   explicit little-endian serialization
//!
//! ## Invariants
//! - Sample rate and per-sample byte size are never computed, only looked up
//!   per kind. They feed both buffer sizing and file-header metadata.
//! - All multi-byte values are serialized little-endian, matching the
//!   on-flash file format.

use crate::error::ConfigError;

/// One of the five recordable physiological data streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    PpgWrist,
    PpgFinger,
    ImuAccel,
    ImuGyro,
    Gsr,
}

impl SignalKind {
    pub const COUNT: usize = 5;

    /// All kinds, in bit/tag order.
    pub const ALL: [SignalKind; SignalKind::COUNT] = [
        SignalKind::PpgWrist,
        SignalKind::PpgFinger,
        SignalKind::ImuAccel,
        SignalKind::ImuGyro,
        SignalKind::Gsr,
    ];

    /// Position of this kind in masks, tags, and per-kind tables.
    pub fn index(&self) -> usize {
        match self {
            SignalKind::PpgWrist => 0,
            SignalKind::PpgFinger => 1,
            SignalKind::ImuAccel => 2,
            SignalKind::ImuGyro => 3,
            SignalKind::Gsr => 4,
        }
    }

    /// Mask bit for this kind.
    pub fn bit(&self) -> u8 {
        1 << self.index()
    }

    /// Nominal sampling rate in Hz.
    pub fn sample_rate_hz(&self) -> u16 {
        match self {
            SignalKind::PpgWrist => 25,
            SignalKind::PpgFinger => 25,
            SignalKind::ImuAccel => 100,
            SignalKind::ImuGyro => 100,
            SignalKind::Gsr => 32,
        }
    }

    /// Serialized size of one sample in bytes.
    pub fn sample_size(&self) -> usize {
        match self {
            SignalKind::PpgWrist => 12,  // IR, red, green u32
            SignalKind::PpgFinger => 8,  // IR, red u32
            SignalKind::ImuAccel => 6,   // x, y, z i16
            SignalKind::ImuGyro => 6,    // x, y, z i16
            SignalKind::Gsr => 4,        // conductance u32
        }
    }

    /// Well-known file name inside a session directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            SignalKind::PpgWrist => "ppgw.bin",
            SignalKind::PpgFinger => "ppgf.bin",
            SignalKind::ImuAccel => "accel.bin",
            SignalKind::ImuGyro => "gyro.bin",
            SignalKind::Gsr => "gsr.bin",
        }
    }

    /// Tag stored in the file header's `signal_kind` byte.
    pub fn tag(&self) -> u8 {
        self.index() as u8
    }

    pub fn from_tag(tag: u8) -> Option<SignalKind> {
        SignalKind::ALL.get(tag as usize).copied()
    }

    pub fn from_file_name(name: &str) -> Option<SignalKind> {
        SignalKind::ALL.iter().copied().find(|k| k.file_name() == name)
    }
}

/// Set of signal kinds enabled for one session.
///
/// Only the low five bits are meaningful. Zero or unknown bits make a
/// recording configuration invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SignalMask(u8);

impl SignalMask {
    /// Bits that correspond to a known signal kind.
    pub const VALID_BITS: u8 = 0b0001_1111;

    pub const EMPTY: SignalMask = SignalMask(0);

    pub fn from_bits(bits: u8) -> SignalMask {
        SignalMask(bits)
    }

    pub fn from_kinds(kinds: &[SignalKind]) -> SignalMask {
        SignalMask(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, kind: SignalKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn unknown_bits(&self) -> u8 {
        self.0 & !Self::VALID_BITS
    }

    /// Rejects an empty mask or one with bits outside the known kinds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptySignalMask);
        }
        let unknown = self.unknown_bits();
        if unknown != 0 {
            return Err(ConfigError::UnknownSignalBits(unknown));
        }
        Ok(())
    }

    /// Iterates the enabled kinds in bit order.
    pub fn iter(&self) -> impl Iterator<Item = SignalKind> + '_ {
        SignalKind::ALL.iter().copied().filter(move |k| self.contains(*k))
    }
}

/// A sample that knows how to serialize itself into the file byte stream.
pub trait Sample {
    /// Serialized size in bytes. Must match `SignalKind::sample_size`.
    const SIZE: usize;

    fn write_le(&self, out: &mut Vec<u8>);
}

/// Packs a batch of samples into their interleaved little-endian layout.
pub fn pack<S: Sample>(samples: &[S]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * S::SIZE);
    for sample in samples {
        sample.write_le(&mut out);
    }
    out
}

/// Wrist PPG sample: three optical channels per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpgWristSample {
    pub ir: u32,
    pub red: u32,
    pub green: u32,
}

impl Sample for PpgWristSample {
    const SIZE: usize = 12;

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ir.to_le_bytes());
        out.extend_from_slice(&self.red.to_le_bytes());
        out.extend_from_slice(&self.green.to_le_bytes());
    }
}

/// Finger PPG sample: two optical channels per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpgFingerSample {
    pub ir: u32,
    pub red: u32,
}

impl Sample for PpgFingerSample {
    const SIZE: usize = 8;

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ir.to_le_bytes());
        out.extend_from_slice(&self.red.to_le_bytes());
    }
}

/// Three-axis IMU sample, used by both the accel and gyro streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Sample for ImuSample {
    const SIZE: usize = 6;

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.z.to_le_bytes());
    }
}

/// Galvanic skin response sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GsrSample {
    pub value: u32,
}

impl Sample for GsrSample {
    const SIZE: usize = 4;

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
    }
}
