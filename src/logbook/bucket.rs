//! Hour buckets and log file naming.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};

/// File extension of every log file.
pub const LOG_EXTENSION: &str = ".csv";

/// Default file name prefix, `ctg_frames_YYYYmmdd_HH.csv`.
pub const DEFAULT_FILE_PREFIX: &str = "ctg_frames_";

/// The calendar hour a record belongs to, as a `YYYYmmdd_HH` key.
///
/// Two timestamps share a bucket exactly when their keys are equal, so the
/// key doubles as the file name stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HourBucket {
    key: String,
}

impl HourBucket {
    /// Bucket containing `time`, keyed in that time's own zone.
    pub fn containing<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self {
            key: time.format("%Y%m%d_%H").to_string(),
        }
    }

    /// Bucket containing `time` in the machine's local zone.
    pub fn local<Tz: TimeZone>(time: &DateTime<Tz>) -> Self {
        Self::containing(&time.with_timezone(&Local))
    }

    /// The `YYYYmmdd_HH` key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// File name for this bucket with the given prefix.
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, self.key, LOG_EXTENSION)
    }
}

impl fmt::Display for HourBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Check whether `name` looks like a log file written with `prefix`.
pub fn is_log_file_name(name: &str, prefix: &str) -> bool {
    name.len() > prefix.len() + LOG_EXTENSION.len()
        && name.starts_with(prefix)
        && name.ends_with(LOG_EXTENSION)
}
