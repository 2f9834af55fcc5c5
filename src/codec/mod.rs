//! Codec module - text encodings for persisted payloads.
//!
//! This module provides the CSV log format:
//!
//! - [`HexCodec`] - payload bytes as space-separated lowercase hex
//! - [`LogRecord`] - one timestamped payload and its CSV row
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//!
//! # Example
//!
//! ```
//! use iceplant::codec::{HexCodec, LogRecord};
//! use bytes::Bytes;
//!
//! let record = LogRecord::new(1718000000.5, Bytes::from_static(b"G"));
//! assert_eq!(record.to_row(), "1718000000.5,1,47");
//! assert_eq!(HexCodec::decode("47").unwrap(), b"G");
//! ```

mod hex;
mod record;

pub use hex::HexCodec;
pub use record::{epoch_seconds, LogRecord, CSV_HEADER};
