//! # iceplant
//!
//! Serial telemetry acquisition for bedside monitors that speak a
//! `DLE STX ... DLE ETX` framed protocol with a CRC-16 trailer.
//!
//! Validated payloads are stored, byte for byte, in one CSV file per local
//! hour under a data directory bounded by file count and free space.
//!
//! ## Architecture
//!
//! ```text
//! serial bytes -> FrameExtractor -> validate -> LogWriter -> <prefix>YYYYmmdd_HH.csv
//!                                                  ^
//!                               RetentionPolicy ---+
//! ```
//!
//! - [`protocol`] - escaping, CRC, frame building, extraction and validation
//! - [`logbook`] - hour buckets, the log writer and the retention policy
//! - [`acquisition`] - the poll / auto-send loop tying link and log together
//! - [`transport`] - the [`Link`](transport::Link) trait and the serial port
//!
//! ## Example
//!
//! ```
//! use iceplant::protocol::{build_frame, validate, Command, FrameExtractor};
//!
//! let mut wire = Command::Poll.encode();
//! wire.extend(build_frame(&[0x53, 0x10, 0x00]));
//!
//! let mut extractor = FrameExtractor::new();
//! let frames = extractor.push(&wire);
//! assert_eq!(frames.len(), 2);
//! assert_eq!(&validate(frames[0].as_bytes()).unwrap()[..], b"?C");
//! assert_eq!(&frames[1].validate().unwrap()[..], &[0x53, 0x10, 0x00]);
//! ```

pub mod acquisition;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod logbook;
pub mod protocol;
pub mod sim;
pub mod transport;
pub mod viewer;

#[cfg(test)]
mod test_support;

pub use acquisition::{Acquisition, AcquisitionStats, LinkState};
pub use config::Config;
pub use error::{IcePlantError, Result};
