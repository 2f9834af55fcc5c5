//! Hex codec - payload bytes as space-separated lowercase hex.
//!
//! This is the text form used in the `payload_hex` CSV column.
//!
//! # Example
//!
//! ```
//! use iceplant::codec::HexCodec;
//!
//! let text = HexCodec::encode(&[0x53, 0x80, 0x0a]);
//! assert_eq!(text, "53 80 0a");
//! assert_eq!(HexCodec::decode(&text).unwrap(), vec![0x53, 0x80, 0x0a]);
//! ```

use std::fmt::Write as _;

/// Codec between raw bytes and `"xx xx xx"` hex text.
pub struct HexCodec;

impl HexCodec {
    /// Encode bytes as lowercase hex pairs separated by single spaces.
    pub fn encode(data: &[u8]) -> String {
        let mut text = String::with_capacity(data.len() * 3);
        for (i, byte) in data.iter().enumerate() {
            if i > 0 {
                text.push(' ');
            }
            let _ = write!(text, "{:02x}", byte);
        }
        text
    }

    /// Decode whitespace-separated hex pairs.
    ///
    /// Returns `None` if any token is not a one- or two-digit hex number.
    pub fn decode(text: &str) -> Option<Vec<u8>> {
        text.split_whitespace()
            .map(|token| {
                if token.len() > 2 {
                    return None;
                }
                u8::from_str_radix(token, 16).ok()
            })
            .collect()
    }

    /// Decode only the byte at `index`, as the live viewer does.
    pub fn byte_at(text: &str, index: usize) -> Option<u8> {
        let token = text.split_whitespace().nth(index)?;
        u8::from_str_radix(token, 16).ok()
    }
}
