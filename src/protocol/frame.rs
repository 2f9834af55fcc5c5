//! Candidate frames, the frame builder and the frame validator.
//!
//! A [`CandidateFrame`] is what the extractor cuts out of the byte stream:
//! start marker through CRC trailer, not yet checked. [`validate`] turns it
//! into a payload or a [`Rejection`].
//!
//! # Example
//!
//! ```
//! use iceplant::protocol::{build_frame, validate};
//!
//! let bytes = build_frame(b"?C");
//! let payload = validate(&bytes).unwrap();
//! assert_eq!(&payload[..], b"?C");
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::wire_format::{
    crc16, escape, trailing_crc, unescape_strict, CRC_SIZE, END_MARKER, MIN_FRAME_SIZE,
    START_MARKER,
};

/// Why a candidate frame was rejected.
///
/// Rejections are per-frame and never abort the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Shorter than markers plus CRC.
    #[error("frame too short: {len} bytes")]
    TooShort { len: usize },

    /// First two bytes are not `DLE STX`.
    #[error("missing start marker")]
    BadStartMarker,

    /// The two bytes before the CRC are not `DLE ETX`.
    #[error("missing end marker")]
    BadEndMarker,

    /// Trailer disagrees with the CRC computed over the frame.
    #[error("CRC mismatch: computed {expected:#06x}, received {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// A `DLE` inside the payload region without its doubling partner.
    #[error("unpaired escape byte at payload offset {offset}")]
    UnpairedEscape { offset: usize },
}

impl Rejection {
    /// Check if this rejection is a CRC failure (as opposed to a malformed envelope).
    #[inline]
    pub fn is_crc_mismatch(&self) -> bool {
        matches!(self, Rejection::CrcMismatch { .. })
    }
}

/// A frame as found on the wire: start marker through CRC trailer.
///
/// May still be malformed or corrupted; see [`CandidateFrame::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFrame {
    bytes: Bytes,
}

impl CandidateFrame {
    /// Wrap raw frame bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Create a candidate from a slice (copies data).
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    /// Get the raw frame bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the frame length in bytes, including markers and CRC.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Get the CRC trailer, if the frame is long enough to have one.
    #[inline]
    pub fn crc(&self) -> Option<u16> {
        trailing_crc(&self.bytes)
    }

    /// Validate this frame and return its unescaped payload.
    pub fn validate(&self) -> Result<Bytes, Rejection> {
        validate(&self.bytes)
    }

    /// Consume the frame and return its raw bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for CandidateFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Build a complete frame for `payload`.
///
/// Emits `DLE STX`, the escaped payload, `DLE ETX` and the big-endian
/// CRC-16 of everything before it. This is exactly what goes on the wire.
///
/// # Example
///
/// ```
/// use iceplant::protocol::build_frame;
///
/// let bytes = build_frame(b"G");
/// assert_eq!(&bytes[..5], &[0x10, 0x02, b'G', 0x10, 0x03]);
/// assert_eq!(bytes.len(), 7);
/// ```
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let escaped = escape(payload);
    let mut buf = Vec::with_capacity(MIN_FRAME_SIZE + escaped.len());
    buf.extend_from_slice(&START_MARKER);
    buf.extend_from_slice(&escaped);
    buf.extend_from_slice(&END_MARKER);
    let crc = crc16(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// Structurally check and CRC-verify a frame, returning its payload.
///
/// Checks run in order: length, start marker, end marker, CRC, then strict
/// unescaping of the bytes between the markers.
pub fn validate(frame: &[u8]) -> Result<Bytes, Rejection> {
    let len = frame.len();
    if len < MIN_FRAME_SIZE {
        return Err(Rejection::TooShort { len });
    }

    if frame[..2] != START_MARKER {
        return Err(Rejection::BadStartMarker);
    }

    let end = len - CRC_SIZE - END_MARKER.len();
    if frame[end..end + 2] != END_MARKER {
        return Err(Rejection::BadEndMarker);
    }

    let expected = crc16(&frame[..len - CRC_SIZE]);
    let actual = u16::from_be_bytes([frame[len - 2], frame[len - 1]]);
    if expected != actual {
        return Err(Rejection::CrcMismatch { expected, actual });
    }

    let payload = unescape_strict(&frame[START_MARKER.len()..end])?;
    Ok(Bytes::from(payload))
}

/// Outbound control commands understood by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request one data block (`?C`).
    Poll,
    /// Switch the monitor to auto-send mode (`G`).
    AutoSend,
}

impl Command {
    /// Get the unframed command payload.
    pub fn payload(&self) -> &'static [u8] {
        match self {
            Command::Poll => b"?C",
            Command::AutoSend => b"G",
        }
    }

    /// Build the framed bytes to write to the link.
    pub fn encode(&self) -> Vec<u8> {
        build_frame(self.payload())
    }
}
