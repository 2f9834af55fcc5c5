//! Live terminal viewer over the CSV logs.
//!
//! Follows the newest `<prefix>*.csv` file in the data directory like
//! `tail -f`, switches to a newer file when the writer rotates, and draws one
//! payload byte as an ASCII sparkline.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::codec::HexCodec;
use crate::error::Result;
use crate::logbook::{is_log_file_name, DEFAULT_DATA_DIR, DEFAULT_FILE_PREFIX};

/// Sparkline glyphs from lowest to highest.
pub const LEVELS: &[u8] = b" .:-=+*#%@";

/// Viewer settings.
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub data_dir: PathBuf,
    pub file_prefix: String,
    /// Payload byte to plot.
    pub byte_index: usize,
    /// Plot width in characters.
    pub width: usize,
    /// Replay the current file from its first row instead of its end.
    pub from_start: bool,
    pub poll_interval: Duration,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            byte_index: 0,
            width: 80,
            from_start: false,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// One plotted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Timestamp column, verbatim.
    pub timestamp: String,
    pub value: u8,
}

/// Bounded history rendered as one line of glyphs.
#[derive(Debug, Clone)]
pub struct Sparkline {
    values: VecDeque<u8>,
    width: usize,
}

impl Sparkline {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            values: VecDeque::with_capacity(width),
            width,
        }
    }

    pub fn push(&mut self, value: u8) {
        if self.values.len() == self.width {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn render(&self) -> String {
        let top = LEVELS.len() - 1;
        self.values
            .iter()
            .map(|&v| LEVELS[v as usize * top / 255] as char)
            .collect()
    }
}

/// Newest log file in `dir` by modification time, ties broken by name.
pub fn latest_log_file(dir: &Path, prefix: &str) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_str().is_some_and(|n| is_log_file_name(n, prefix)) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modified = metadata.modified()?;
        let path = entry.path();
        let is_newer = match &newest {
            None => true,
            Some((time, best)) => (modified, &path) > (*time, best),
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Pull the timestamp and the byte at `index` out of a CSV row.
pub fn sample_from_row(line: &str, index: usize) -> Option<Sample> {
    let mut fields = line.trim().splitn(3, ',');
    let timestamp = fields.next()?;
    let _len = fields.next()?;
    let value = HexCodec::byte_at(fields.next()?, index)?;
    Some(Sample {
        timestamp: timestamp.to_string(),
        value,
    })
}

struct Follower {
    path: PathBuf,
    reader: BufReader<File>,
    partial: String,
}

impl Follower {
    fn open(path: PathBuf, from_start: bool) -> io::Result<Self> {
        let mut file = File::open(&path)?;
        if !from_start {
            file.seek(SeekFrom::End(0))?;
        }
        Ok(Self {
            path,
            reader: BufReader::new(file),
            partial: String::new(),
        })
    }

    /// Complete lines appended since the last call. A line still being
    /// written is held back until its newline arrives.
    fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let n = self.reader.read_line(&mut self.partial)?;
            if n == 0 {
                return Ok(lines);
            }
            if self.partial.ends_with('\n') {
                lines.push(std::mem::take(&mut self.partial));
            }
        }
    }
}

/// Tails the newest log file and keeps the sparkline.
pub struct Viewer {
    options: ViewerOptions,
    follower: Option<Follower>,
    sparkline: Sparkline,
    opened_first: bool,
}

impl Viewer {
    pub fn new(options: ViewerOptions) -> Self {
        let sparkline = Sparkline::new(options.width);
        Self {
            options,
            follower: None,
            sparkline,
            opened_first: false,
        }
    }

    /// File being followed.
    pub fn current_path(&self) -> Option<&Path> {
        self.follower.as_ref().map(|f| f.path.as_path())
    }

    pub fn sparkline(&self) -> &Sparkline {
        &self.sparkline
    }

    /// Read whatever was appended since the last poll, following rotation.
    ///
    /// Only the first file opened honours `from_start = false`; files found
    /// after a rotation are read from their first row.
    pub fn poll(&mut self) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();

        if let Some(follower) = self.follower.as_mut() {
            if follower.path.exists() {
                let lines = follower.read_lines()?;
                samples = self.plot(&lines);
                if !samples.is_empty() {
                    return Ok(samples);
                }
            }
        }

        let latest = latest_log_file(&self.options.data_dir, &self.options.file_prefix)?;
        if let Some(latest) = latest {
            if self.current_path() != Some(latest.as_path()) {
                let from_start = self.opened_first || self.options.from_start;
                tracing::debug!(path = %latest.display(), "Following log file");
                let mut follower = Follower::open(latest, from_start)?;
                self.opened_first = true;
                let lines = follower.read_lines()?;
                samples = self.plot(&lines);
                self.follower = Some(follower);
            }
        }
        Ok(samples)
    }

    fn plot(&mut self, lines: &[String]) -> Vec<Sample> {
        let samples: Vec<Sample> = lines
            .iter()
            .filter_map(|line| sample_from_row(line, self.options.byte_index))
            .collect();
        for sample in &samples {
            self.sparkline.push(sample.value);
        }
        samples
    }

    /// Screen contents for the latest sample.
    pub fn render(&self, last: &Sample) -> String {
        format!(
            "\x1b[2J\x1b[Hbyte={} last={} ts={}\n{}\n",
            self.options.byte_index,
            last.value,
            last.timestamp,
            self.sparkline.render()
        )
    }

    /// Poll and redraw into `out` until `shutdown` resolves.
    pub async fn run<W, F>(&mut self, out: &mut W, shutdown: F) -> Result<()>
    where
        W: Write,
        F: Future,
    {
        tokio::pin!(shutdown);
        let mut warned = false;

        loop {
            let samples = self.poll()?;
            if let Some(last) = samples.last() {
                out.write_all(self.render(last).as_bytes())?;
                out.flush()?;
            } else if self.follower.is_none() && !warned {
                tracing::warn!(
                    dir = %self.options.data_dir.display(),
                    "No log files yet, waiting"
                );
                warned = true;
            }

            tokio::select! {
                biased;
                _ = shutdown.as_mut() => return Ok(()),
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
    }
}
