//! Log records and their CSV row form.
//!
//! One record per validated payload:
//! ```text
//! timestamp,payload_len,payload_hex
//! 1718000000.25,5,53 80 00 21 10
//! ```

use bytes::Bytes;
use chrono::{DateTime, TimeZone};

use super::HexCodec;

/// Header row written at the top of every log file.
pub const CSV_HEADER: &str = "timestamp,payload_len,payload_hex";

/// One persisted payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Seconds since the Unix epoch, with fractional part.
    pub timestamp: f64,
    /// Payload length in bytes.
    pub payload_len: usize,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl LogRecord {
    /// Create a record for `payload` stamped with `timestamp` seconds.
    pub fn new(timestamp: f64, payload: Bytes) -> Self {
        Self {
            timestamp,
            payload_len: payload.len(),
            payload,
        }
    }

    /// Create a record stamped with the given wall-clock time.
    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>, payload: Bytes) -> Self {
        Self::new(epoch_seconds(time), payload)
    }

    /// Render as a CSV row (no trailing newline).
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{}",
            format_timestamp(self.timestamp),
            self.payload_len,
            HexCodec::encode(&self.payload)
        )
    }

    /// Parse a CSV row. Returns `None` for the header, blank lines and
    /// malformed rows.
    pub fn parse_row(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(3, ',');
        let timestamp = fields.next()?.trim().parse::<f64>().ok()?;
        let payload_len = fields.next()?.trim().parse::<usize>().ok()?;
        let payload = HexCodec::decode(fields.next()?)?;

        if payload.len() != payload_len {
            return None;
        }

        Some(Self {
            timestamp,
            payload_len,
            payload: Bytes::from(payload),
        })
    }
}

/// Seconds since the epoch with microsecond resolution.
pub fn epoch_seconds<Tz: TimeZone>(time: &DateTime<Tz>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// Format a timestamp as a float, always with a fractional part.
fn format_timestamp(timestamp: f64) -> String {
    let text = timestamp.to_string();
    if text.contains('.') || !timestamp.is_finite() {
        text
    } else {
        format!("{}.0", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_to_row() {
        let record = LogRecord::new(1718000000.25, Bytes::from_static(&[0x53, 0x80, 0x10]));
        assert_eq!(record.to_row(), "1718000000.25,3,53 80 10");
    }

    #[test]
    fn test_whole_second_timestamp_keeps_fraction() {
        let record = LogRecord::new(1718000000.0, Bytes::from_static(b"G"));
        assert_eq!(record.to_row(), "1718000000.0,1,47");
    }

    #[test]
    fn test_empty_payload_row() {
        let record = LogRecord::new(1.5, Bytes::new());
        assert_eq!(record.to_row(), "1.5,0,");
        assert_eq!(LogRecord::parse_row("1.5,0,").unwrap(), record);
    }

    #[test]
    fn test_parse_row() {
        let record = LogRecord::parse_row("1718000000.25,3,53 80 10\n").unwrap();
        assert_eq!(record.timestamp, 1718000000.25);
        assert_eq!(record.payload_len, 3);
        assert_eq!(&record.payload[..], &[0x53, 0x80, 0x10]);
    }

    #[test]
    fn test_parse_row_rejects_header_and_garbage() {
        assert!(LogRecord::parse_row(CSV_HEADER).is_none());
        assert!(LogRecord::parse_row("").is_none());
        assert!(LogRecord::parse_row("1.0,2,53").is_none());
        assert!(LogRecord::parse_row("1.0,1").is_none());
    }

    #[test]
    fn test_at_uses_epoch_seconds() {
        let time = Utc.timestamp_opt(1_718_000_000, 500_000_000).unwrap();
        let record = LogRecord::at(&time, Bytes::from_static(b"G"));
        assert_eq!(record.timestamp, 1_718_000_000.5);
        assert_eq!(record.payload_len, 1);
    }
}
