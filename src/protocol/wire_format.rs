//! Wire format: control bytes, byte stuffing and the CRC-16 trailer.
//!
//! Every frame on the link looks like this:
//! ```text
//! ┌─────────┬──────────────────┬─────────┬──────────┐
//! │ DLE STX │ escaped payload  │ DLE ETX │ CRC-16   │
//! │ 2 bytes │ variable         │ 2 bytes │ 2 bytes  │
//! │         │ DLE doubled      │         │ uint16 BE│
//! └─────────┴──────────────────┴─────────┴──────────┘
//! ```
//!
//! The CRC covers everything from the start marker through the end marker
//! inclusive, in escaped form.

use crc::{Crc, CRC_16_XMODEM};

use super::Rejection;

/// Data link escape. First byte of both markers, doubled inside payloads.
pub const DLE: u8 = 0x10;

/// Start of text. Second byte of the start marker.
pub const STX: u8 = 0x02;

/// End of text. Second byte of the end marker.
pub const ETX: u8 = 0x03;

/// Start marker (`DLE STX`).
pub const START_MARKER: [u8; 2] = [DLE, STX];

/// End marker (`DLE ETX`).
pub const END_MARKER: [u8; 2] = [DLE, ETX];

/// Size of the CRC trailer in bytes.
pub const CRC_SIZE: usize = 2;

/// Smallest possible frame: markers plus CRC around an empty payload.
pub const MIN_FRAME_SIZE: usize = START_MARKER.len() + END_MARKER.len() + CRC_SIZE;

/// Frame checksum: poly 0x1021, init 0, MSB first, no final XOR.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Double every `DLE` so payload bytes cannot be mistaken for a marker.
///
/// # Example
///
/// ```
/// use iceplant::protocol::{escape, DLE};
///
/// assert_eq!(escape(&[0x01, DLE, 0x02]), vec![0x01, DLE, DLE, 0x02]);
/// ```
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(payload.len() + payload.len() / 8);
    for &byte in payload {
        escaped.push(byte);
        if byte == DLE {
            escaped.push(DLE);
        }
    }
    escaped
}

/// Collapse every `DLE DLE` pair into a single `DLE`.
///
/// Any other byte passes through unchanged, including a `DLE` followed by
/// something other than `DLE` and a lone `DLE` at the very end.
pub fn unescape(raw: &[u8]) -> Vec<u8> {
    let mut unescaped = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        unescaped.push(byte);
        if byte == DLE && raw.get(i + 1) == Some(&DLE) {
            i += 2;
        } else {
            i += 1;
        }
    }
    unescaped
}

/// Like [`unescape`], but every `DLE` must be part of a `DLE DLE` pair.
///
/// Returns [`Rejection::UnpairedEscape`] with the offset of the first
/// offending byte otherwise. A lone `DLE` right before the end marker lands
/// here too.
pub fn unescape_strict(raw: &[u8]) -> Result<Vec<u8>, Rejection> {
    let mut unescaped = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        if byte == DLE {
            if raw.get(i + 1) != Some(&DLE) {
                return Err(Rejection::UnpairedEscape { offset: i });
            }
            i += 2;
        } else {
            i += 1;
        }
        unescaped.push(byte);
    }
    Ok(unescaped)
}

/// CRC-16 with polynomial 0x1021, initial value 0, MSB first, no final XOR.
///
/// # Example
///
/// ```
/// use iceplant::protocol::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0x31C3);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Read the big-endian CRC trailer of a frame.
///
/// Returns `None` if the frame is shorter than the trailer.
#[inline]
pub fn trailing_crc(frame: &[u8]) -> Option<u16> {
    let tail = frame.len().checked_sub(CRC_SIZE)?;
    Some(u16::from_be_bytes([frame[tail], frame[tail + 1]]))
}
