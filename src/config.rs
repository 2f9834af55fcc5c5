//! Runtime configuration.
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is valid:
//!
//! ```json
//! {
//!   "serial": { "port": "/dev/ttyUSB0", "baud_rate": 1200 },
//!   "storage": { "data_dir": "/var/lib/iceplant", "max_files": 48 },
//!   "acquisition": { "retention_every": 50 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{IcePlantError, Result};
use crate::logbook::retention::{DEFAULT_MAX_FILES, DEFAULT_MIN_FREE_BYTES};
use crate::logbook::{LogWriterConfig, RetentionPolicy, DEFAULT_DATA_DIR, DEFAULT_FILE_PREFIX};
use crate::protocol::DEFAULT_MAX_FRAME_LEN;

/// Default serial device.
pub const DEFAULT_PORT: &str = "/dev/serial0";

/// Default baud rate of the monitor's serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 1200;

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// `serial` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// 5 to 8.
    pub data_bits: u8,
    pub parity: Parity,
    /// 1 or 2.
    pub stop_bits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

/// `storage` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub file_prefix: String,
    pub max_files: usize,
    pub min_free_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            max_files: DEFAULT_MAX_FILES,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
        }
    }
}

impl StorageConfig {
    /// Log writer settings for this section.
    pub fn writer_config(&self) -> LogWriterConfig {
        LogWriterConfig {
            data_dir: self.data_dir.clone(),
            file_prefix: self.file_prefix.clone(),
            retention: RetentionPolicy::new(self.max_files, self.min_free_bytes),
        }
    }
}

/// `acquisition` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Wait between sending a poll and reading its response.
    pub poll_interval_ms: u64,
    /// Upper bound on a single read.
    pub read_timeout_ms: u64,
    /// Read size while polling.
    pub poll_read_chunk: usize,
    /// Read size in auto-send mode.
    pub read_chunk: usize,
    /// Run retention every this many logged payloads. Zero disables it.
    pub retention_every: u64,
    /// Largest unterminated frame the extractor buffers.
    pub max_frame_len: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            read_timeout_ms: 1000,
            poll_read_chunk: 256,
            read_chunk: 512,
            retention_every: 100,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl AcquisitionConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub storage: StorageConfig,
    pub acquisition: AcquisitionConfig,
}

impl Config {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check values that would make the loop spin or the port unusable.
    pub fn validate(&self) -> Result<()> {
        let serial = &self.serial;
        if serial.port.is_empty() {
            return Err(IcePlantError::Config("serial.port is empty".into()));
        }
        if serial.baud_rate == 0 {
            return Err(IcePlantError::Config("serial.baud_rate must be > 0".into()));
        }
        if !(5..=8).contains(&serial.data_bits) {
            return Err(IcePlantError::Config(format!(
                "serial.data_bits must be 5..=8, got {}",
                serial.data_bits
            )));
        }
        if !(1..=2).contains(&serial.stop_bits) {
            return Err(IcePlantError::Config(format!(
                "serial.stop_bits must be 1 or 2, got {}",
                serial.stop_bits
            )));
        }

        if self.storage.file_prefix.is_empty() {
            return Err(IcePlantError::Config("storage.file_prefix is empty".into()));
        }
        if self.storage.file_prefix.contains(['/', '\\']) {
            return Err(IcePlantError::Config(
                "storage.file_prefix must not contain a path separator".into(),
            ));
        }

        let acq = &self.acquisition;
        if acq.poll_interval_ms == 0 || acq.read_timeout_ms == 0 {
            return Err(IcePlantError::Config(
                "acquisition intervals must be > 0".into(),
            ));
        }
        if acq.read_chunk == 0 || acq.poll_read_chunk == 0 {
            return Err(IcePlantError::Config(
                "acquisition read chunks must be > 0".into(),
            ));
        }
        if acq.max_frame_len < crate::protocol::MIN_FRAME_SIZE {
            return Err(IcePlantError::Config(format!(
                "acquisition.max_frame_len must be >= {}",
                crate::protocol::MIN_FRAME_SIZE
            )));
        }
        Ok(())
    }
}
