//! Hour-bucketed CSV log writer.
//!
//! One file is open at a time. Retention runs before every file is opened,
//! with the file about to be opened already counted against the budget, and
//! again whenever the owner calls [`LogWriter::enforce_retention`].
//!
//! # Durability
//!
//! Each [`append`](LogWriter::append) flushes the buffered writer, so a crash
//! loses at most the record being written.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::codec::{LogRecord, CSV_HEADER};
use crate::error::{IcePlantError, Result};

use super::bucket::{HourBucket, DEFAULT_FILE_PREFIX};
use super::retention::{Fs2Probe, RetentionPolicy, RetentionReport, SpaceProbe};

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Configuration for the log writer.
#[derive(Debug, Clone)]
pub struct LogWriterConfig {
    /// Directory holding the log files. Created on first open.
    pub data_dir: PathBuf,
    /// File name prefix before the hour key.
    pub file_prefix: String,
    /// Eviction limits.
    pub retention: RetentionPolicy,
}

impl Default for LogWriterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            retention: RetentionPolicy::default(),
        }
    }
}

struct OpenLog {
    bucket: HourBucket,
    path: PathBuf,
    file: BufWriter<File>,
}

/// Writes validated payloads into one CSV file per local hour.
pub struct LogWriter<P: SpaceProbe = Fs2Probe> {
    config: LogWriterConfig,
    probe: P,
    current: Option<OpenLog>,
    records_written: u64,
}

impl LogWriter<Fs2Probe> {
    /// Create a writer measuring free space with `fs2`. No file is opened yet.
    pub fn new(config: LogWriterConfig) -> Self {
        Self::with_probe(config, Fs2Probe)
    }
}

impl<P: SpaceProbe> LogWriter<P> {
    /// Create a writer with a custom free-space probe.
    pub fn with_probe(config: LogWriterConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            current: None,
            records_written: 0,
        }
    }

    /// Writer configuration.
    pub fn config(&self) -> &LogWriterConfig {
        &self.config
    }

    /// Bucket of the open file, if any.
    pub fn current_bucket(&self) -> Option<&HourBucket> {
        self.current.as_ref().map(|open| &open.bucket)
    }

    /// Path of the open file, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|open| open.path.as_path())
    }

    /// Whether a file is open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Records appended since the writer was created.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Path of the file for `bucket`.
    pub fn path_for(&self, bucket: &HourBucket) -> PathBuf {
        self.config
            .data_dir
            .join(bucket.file_name(&self.config.file_prefix))
    }

    /// Open the file for the local hour containing `time`.
    ///
    /// Closes any open file first, then runs retention, then opens the
    /// bucket's file for append. A header row is written if the file is new
    /// or empty.
    pub fn open_bucket<Tz: TimeZone>(&mut self, time: &DateTime<Tz>) -> Result<()> {
        self.close()?;

        let bucket = HourBucket::local(time);
        let path = self.path_for(&bucket);

        fs::create_dir_all(&self.config.data_dir)?;
        let report = self.config.retention.enforce(
            &self.config.data_dir,
            &self.config.file_prefix,
            Some(&path),
            &self.probe,
        )?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut file = BufWriter::new(file);
        if is_new {
            writeln!(file, "{}", CSV_HEADER)?;
            file.flush()?;
        }

        tracing::info!(
            path = %path.display(),
            bucket = %bucket,
            new = is_new,
            evicted = report.removed.len(),
            "Opened log file"
        );

        self.current = Some(OpenLog { bucket, path, file });
        Ok(())
    }

    /// Append one record to the open file and flush it.
    ///
    /// # Errors
    ///
    /// I/O error if no file is open or the write fails.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let open = self.current.as_mut().ok_or_else(|| {
            IcePlantError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "no log file open",
            ))
        })?;

        writeln!(open.file, "{}", record.to_row())?;
        open.file.flush()?;
        self.records_written += 1;
        Ok(())
    }

    /// Switch files if `time` falls in a different local hour than the open
    /// file, or if no file is open. Returns whether a file was (re)opened.
    pub fn rotate_if_needed<Tz: TimeZone>(&mut self, time: &DateTime<Tz>) -> Result<bool> {
        let bucket = HourBucket::local(time);
        if self.current_bucket() == Some(&bucket) {
            return Ok(false);
        }

        if let Some(previous) = self.current_bucket() {
            tracing::info!(from = %previous, to = %bucket, "Rotating log file");
        }
        self.open_bucket(time)?;
        Ok(true)
    }

    /// Run retention now. The open file is never deleted.
    pub fn enforce_retention(&self) -> Result<RetentionReport> {
        self.config.retention.enforce(
            &self.config.data_dir,
            &self.config.file_prefix,
            self.current_path(),
            &self.probe,
        )
    }

    /// Flush and close the open file. Calling it with nothing open is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(open) = self.current.take() {
            let mut file = open.file;
            file.flush()?;
            tracing::debug!(path = %open.path.display(), "Closed log file");
        }
        Ok(())
    }
}

impl<P: SpaceProbe> Drop for LogWriter<P> {
    fn drop(&mut self) {
        if let Some(open) = self.current.as_mut() {
            let _ = open.file.flush();
        }
    }
}
