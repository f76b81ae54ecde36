//! # Signal File Header Module
//!
//! Bit-exact encode/decode of the 32-byte header that makes each per-signal
//! file self-describing. All fields are little-endian.
//!
//! ## Layout (32 bytes)
//! ```text
//! offset  size  field
//!      0     4  magic            "VREC" (0x43455256 LE)
//!      4     2  version          currently 1
//!      6     1  signal_kind      SignalKind tag
//!      7     1  pad              zero
//!      8     2  sample_rate_hz   fixed per-kind rate
//!     10     8  start_timestamp  Unix seconds, signed
//!     18     4  num_samples      0 at creation, rewritten at finalize
//!     22    10  reserved         zero padding to 32 bytes
//! ```
//!
//! ## Invariants
//! - `num_samples` is the only field ever mutated after the initial write:
//!   the writer seeks to `NUM_SAMPLES_OFFSET` at finalize and rewrites it
//!   with the true count.
//! - A header whose `num_samples` is still 0 marks a file that was never
//!   finalized (abrupt power loss mid-session). Readers must not trust the
//!   file length alone in that case; the trailing sample stream may be
//!   partial.

use crate::signal::SignalKind;
use std::fmt;

pub const HEADER_MAGIC: u32 = u32::from_le_bytes(*b"VREC");
pub const HEADER_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 32;

/// Byte offset of the `num_samples` field, target of the finalize rewrite.
pub const NUM_SAMPLES_OFFSET: u64 = 18;

/// Decoded per-signal file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub signal: SignalKind,
    pub sample_rate_hz: u16,
    pub start_timestamp: i64,
    pub num_samples: u32,
}

impl FileHeader {
    /// Header for a freshly created file: rate looked up from the kind,
    /// sample count left at the placeholder value.
    pub fn new(signal: SignalKind, start_timestamp: i64) -> Self {
        Self {
            signal,
            sample_rate_hz: signal.sample_rate_hz(),
            start_timestamp,
            num_samples: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&HEADER_VERSION.to_le_bytes());
        buf[6] = self.signal.tag();
        // buf[7] stays zero (pad)
        buf[8..10].copy_from_slice(&self.sample_rate_hz.to_le_bytes());
        buf[10..18].copy_from_slice(&self.start_timestamp.to_le_bytes());
        buf[18..22].copy_from_slice(&self.num_samples.to_le_bytes());
        // buf[22..32] stays zero (reserved)
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, HeaderError> {
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != HEADER_MAGIC {
            return Err(HeaderError::BadMagic(magic));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != HEADER_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let signal = SignalKind::from_tag(buf[6]).ok_or(HeaderError::UnknownSignalTag(buf[6]))?;
        let sample_rate_hz = u16::from_le_bytes([buf[8], buf[9]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[10..18]);
        let start_timestamp = i64::from_le_bytes(ts);
        let num_samples = u32::from_le_bytes([buf[18], buf[19], buf[20], buf[21]]);
        Ok(Self {
            signal,
            sample_rate_hz,
            start_timestamp,
            num_samples,
        })
    }

    /// True if the sample count was never rewritten at finalize.
    ///
    /// The file may still hold partial sample data after the header; its
    /// length is not trustworthy.
    pub fn is_placeholder(&self) -> bool {
        self.num_samples == 0
    }
}

/// Errors decoding a signal file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    BadMagic(u32),
    UnsupportedVersion(u16),
    UnknownSignalTag(u8),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::BadMagic(m) => write!(f, "Bad header magic: {:#010x}", m),
            HeaderError::UnsupportedVersion(v) => write!(f, "Unsupported header version: {}", v),
            HeaderError::UnknownSignalTag(t) => write!(f, "Unknown signal kind tag: {}", t),
        }
    }
}

impl std::error::Error for HeaderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let header = FileHeader {
            signal: SignalKind::Gsr,
            sample_rate_hz: SignalKind::Gsr.sample_rate_hz(),
            start_timestamp: 1_700_000_000,
            num_samples: 160,
        };
        let decoded = FileHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert!(!decoded.is_placeholder());
    }

    #[test]
    fn test_new_header_is_placeholder() {
        let header = FileHeader::new(SignalKind::PpgWrist, 1_700_000_000);
        assert!(header.is_placeholder());
        assert_eq!(header.sample_rate_hz, 25);
    }

    #[test]
    fn test_num_samples_offset_matches_layout() {
        let mut header = FileHeader::new(SignalKind::ImuAccel, 0);
        header.num_samples = 0xAABBCCDD;
        let bytes = header.encode();
        let off = NUM_SAMPLES_OFFSET as usize;
        assert_eq!(&bytes[off..off + 4], &0xAABBCCDDu32.to_le_bytes());
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = FileHeader::new(SignalKind::Gsr, 0).encode();
        bytes[0] = b'X';
        assert!(matches!(
            FileHeader::decode(&bytes),
            Err(HeaderError::BadMagic(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut bytes = FileHeader::new(SignalKind::Gsr, 0).encode();
        bytes[6] = 9;
        assert_eq!(
            FileHeader::decode(&bytes),
            Err(HeaderError::UnknownSignalTag(9))
        );
    }
}
