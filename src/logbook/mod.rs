//! Logbook module - durable storage of validated payloads.
//!
//! - [`HourBucket`] - one log file per local calendar hour
//! - [`LogWriter`] - open, append, rotate and close
//! - [`RetentionPolicy`] - file-count and free-space limits, oldest first

mod bucket;
pub mod retention;
mod writer;

pub use bucket::{is_log_file_name, HourBucket, DEFAULT_FILE_PREFIX, LOG_EXTENSION};
pub use retention::{Fs2Probe, RetentionPolicy, RetentionReport, SpaceProbe};
pub use writer::{LogWriter, LogWriterConfig, DEFAULT_DATA_DIR};
