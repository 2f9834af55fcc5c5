//! Retention policy - bounded file count and free-space floor.
//!
//! Log files are evicted oldest first (modification time, then name). The
//! active file, or the file about to be opened, always occupies one slot of
//! the file budget but is never itself deleted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{IcePlantError, Result};

use super::bucket::is_log_file_name;

/// Default maximum number of log files kept (one week of hours).
pub const DEFAULT_MAX_FILES: usize = 168;

/// Default free-space floor on the data volume.
pub const DEFAULT_MIN_FREE_BYTES: u64 = 64 * 1024 * 1024;

/// Reports free space on the volume holding a directory.
pub trait SpaceProbe {
    /// Bytes available to an unprivileged writer in `dir`.
    fn available(&self, dir: &Path) -> io::Result<u64>;
}

/// [`SpaceProbe`] backed by `fs2::available_space`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2Probe;

impl SpaceProbe for Fs2Probe {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        fs2::available_space(dir)
    }
}

/// Limits applied to the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of log files, the active one included. Zero acts as one.
    pub max_files: usize,
    /// Delete old files while the volume has less than this many bytes free.
    /// Zero disables the check.
    pub min_free_bytes: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
        }
    }
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Files deleted, oldest first.
    pub removed: Vec<PathBuf>,
    /// Log files left on disk, the active one included if it exists.
    pub remaining: usize,
}

#[derive(Debug)]
struct LogFileEntry {
    path: PathBuf,
    modified: SystemTime,
}

impl RetentionPolicy {
    /// Create a policy.
    pub fn new(max_files: usize, min_free_bytes: u64) -> Self {
        Self {
            max_files,
            min_free_bytes,
        }
    }

    /// Apply the policy to `dir`.
    ///
    /// `active` names the file being written (or about to be created); it
    /// counts toward `max_files` whether or not it exists yet. Calling this
    /// twice in a row removes nothing the second time unless free space
    /// dropped in between.
    ///
    /// # Errors
    ///
    /// [`IcePlantError::DiskExhausted`] if free space is still below the floor
    /// once every evictable file is gone.
    pub fn enforce(
        &self,
        dir: &Path,
        prefix: &str,
        active: Option<&Path>,
        probe: &dyn SpaceProbe,
    ) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();
        if !dir.is_dir() {
            return Ok(report);
        }

        let (mut candidates, active_exists) = list_log_files(dir, prefix, active)?;
        let limit = self.max_files.max(1);
        let mut occupied = candidates.len() + usize::from(active.is_some());

        let mut next = 0;
        while occupied > limit && next < candidates.len() {
            remove_log_file(&candidates[next].path)?;
            report.removed.push(candidates[next].path.clone());
            next += 1;
            occupied -= 1;
        }

        if self.min_free_bytes > 0 {
            loop {
                let available = probe.available(dir)?;
                if available >= self.min_free_bytes {
                    break;
                }
                if next >= candidates.len() {
                    tracing::error!(
                        dir = %dir.display(),
                        available,
                        required = self.min_free_bytes,
                        "No log files left to evict"
                    );
                    return Err(IcePlantError::DiskExhausted {
                        available,
                        required: self.min_free_bytes,
                    });
                }
                tracing::info!(
                    available,
                    required = self.min_free_bytes,
                    "Free space below floor, evicting oldest log file"
                );
                remove_log_file(&candidates[next].path)?;
                report.removed.push(candidates[next].path.clone());
                next += 1;
            }
        }

        candidates.drain(..next);
        report.remaining = candidates.len() + usize::from(active_exists);
        Ok(report)
    }
}

/// List evictable log files oldest first, and whether `active` exists.
fn list_log_files(
    dir: &Path,
    prefix: &str,
    active: Option<&Path>,
) -> Result<(Vec<LogFileEntry>, bool)> {
    let active_name = active.and_then(Path::file_name);
    let mut active_exists = false;
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name_str) = name.to_str() else {
            continue;
        };
        if !is_log_file_name(name_str, prefix) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            continue;
        }

        if active_name == Some(name.as_os_str()) {
            active_exists = true;
            continue;
        }

        files.push(LogFileEntry {
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }

    files.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });
    Ok((files, active_exists))
}

/// Delete one log file. A file that vanished in the meantime counts as deleted.
fn remove_log_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Removed old log file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backdate, ScratchDir};
    use std::cell::Cell;

    const PREFIX: &str = "ctg_frames_";

    /// Probe reporting a fixed amount plus whatever was freed by deletions.
    struct FakeProbe {
        available: Cell<u64>,
        per_call_gain: u64,
    }

    impl FakeProbe {
        fn new(available: u64, per_call_gain: u64) -> Self {
            Self {
                available: Cell::new(available),
                per_call_gain,
            }
        }
    }

    impl SpaceProbe for FakeProbe {
        fn available(&self, _dir: &Path) -> io::Result<u64> {
            let now = self.available.get();
            self.available.set(now + self.per_call_gain);
            Ok(now)
        }
    }

    fn make_files(dir: &ScratchDir, hours: &[&str]) -> Vec<PathBuf> {
        hours
            .iter()
            .enumerate()
            .map(|(i, hour)| {
                let path = dir.path().join(format!("{}{}.csv", PREFIX, hour));
                fs::write(&path, "timestamp,payload_len,payload_hex\n").unwrap();
                // Oldest first: the first file is backdated the most.
                backdate(&path, (hours.len() - i) as u64 * 3600);
                path
            })
            .collect()
    }

    #[test]
    fn test_zero_files_is_noop() {
        let dir = ScratchDir::new("retention-empty");
        let policy = RetentionPolicy::new(2, 0);
        let report = policy
            .enforce(dir.path(), PREFIX, None, &Fs2Probe)
            .unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn test_missing_dir_is_noop() {
        let dir = ScratchDir::new("retention-missing");
        let missing = dir.path().join("nope");
        let report = RetentionPolicy::new(1, 1 << 40)
            .enforce(&missing, PREFIX, None, &Fs2Probe)
            .unwrap();
        assert_eq!(report, RetentionReport::default());
    }

    #[test]
    fn test_deletes_exactly_enough_oldest_files() {
        let dir = ScratchDir::new("retention-count");
        let files = make_files(&dir, &["20240101_00", "20240101_01", "20240101_02", "20240101_03"]);

        let report = RetentionPolicy::new(2, 0)
            .enforce(dir.path(), PREFIX, None, &Fs2Probe)
            .unwrap();

        assert_eq!(report.removed, vec![files[0].clone(), files[1].clone()]);
        assert_eq!(report.remaining, 2);
        assert!(!files[0].exists());
        assert!(!files[1].exists());
        assert!(files[2].exists());
        assert!(files[3].exists());
    }

    #[test]
    fn test_orders_by_mtime_not_name() {
        let dir = ScratchDir::new("retention-mtime");
        let newer_name = dir.path().join(format!("{}20240101_09.csv", PREFIX));
        let older_name = dir.path().join(format!("{}20240101_05.csv", PREFIX));
        fs::write(&newer_name, "").unwrap();
        fs::write(&older_name, "").unwrap();
        // The lexically later file is the older one on disk.
        backdate(&newer_name, 7200);
        backdate(&older_name, 60);

        let report = RetentionPolicy::new(1, 0)
            .enforce(dir.path(), PREFIX, None, &Fs2Probe)
            .unwrap();

        assert_eq!(report.removed, vec![newer_name.clone()]);
        assert!(older_name.exists());
    }

    #[test]
    fn test_active_file_counts_but_is_never_deleted() {
        let dir = ScratchDir::new("retention-active");
        let files = make_files(&dir, &["20240101_00", "20240101_01", "20240101_02"]);
        // Active file is the oldest on disk.
        let active = files[0].clone();

        let report = RetentionPolicy::new(2, 0)
            .enforce(dir.path(), PREFIX, Some(&active), &Fs2Probe)
            .unwrap();

        assert_eq!(report.removed, vec![files[1].clone()]);
        assert_eq!(report.remaining, 2);
        assert!(active.exists());
    }

    #[test]
    fn test_pending_active_file_takes_a_slot() {
        let dir = ScratchDir::new("retention-pending");
        let files = make_files(&dir, &["20240101_00", "20240101_01", "20240101_02"]);
        let pending = dir.path().join(format!("{}20240101_03.csv", PREFIX));

        let report = RetentionPolicy::new(2, 0)
            .enforce(dir.path(), PREFIX, Some(&pending), &Fs2Probe)
            .unwrap();

        assert_eq!(report.removed, vec![files[0].clone(), files[1].clone()]);
        assert_eq!(report.remaining, 1);
    }

    #[test]
    fn test_max_files_zero_acts_as_one() {
        let dir = ScratchDir::new("retention-zero");
        let files = make_files(&dir, &["20240101_00", "20240101_01"]);

        let report = RetentionPolicy::new(0, 0)
            .enforce(dir.path(), PREFIX, Some(&files[1]), &Fs2Probe)
            .unwrap();

        assert_eq!(report.removed, vec![files[0].clone()]);
        assert!(files[1].exists());
    }

    #[test]
    fn test_idempotent() {
        let dir = ScratchDir::new("retention-idem");
        make_files(&dir, &["20240101_00", "20240101_01", "20240101_02"]);
        let policy = RetentionPolicy::new(2, 0);

        let first = policy.enforce(dir.path(), PREFIX, None, &Fs2Probe).unwrap();
        let second = policy.enforce(dir.path(), PREFIX, None, &Fs2Probe).unwrap();

        assert_eq!(first.removed.len(), 1);
        assert!(second.removed.is_empty());
        assert_eq!(second.remaining, 2);
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = ScratchDir::new("retention-foreign");
        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, "keep me").unwrap();
        backdate(&foreign, 100_000);
        make_files(&dir, &["20240101_00", "20240101_01"]);

        RetentionPolicy::new(1, 0)
            .enforce(dir.path(), PREFIX, None, &Fs2Probe)
            .unwrap();

        assert!(foreign.exists());
    }

    #[test]
    fn test_free_space_evicts_until_floor_met() {
        let dir = ScratchDir::new("retention-space");
        let files = make_files(&dir, &["20240101_00", "20240101_01", "20240101_02"]);
        // 100 available on the first probe, +50 after each deletion.
        let probe = FakeProbe::new(100, 50);

        let report = RetentionPolicy::new(10, 200)
            .enforce(dir.path(), PREFIX, None, &probe)
            .unwrap();

        assert_eq!(report.removed, vec![files[0].clone(), files[1].clone()]);
        assert_eq!(report.remaining, 1);
        assert!(files[2].exists());
    }

    #[test]
    fn test_disk_exhausted_when_nothing_left() {
        let dir = ScratchDir::new("retention-exhausted");
        let files = make_files(&dir, &["20240101_00", "20240101_01"]);
        let probe = FakeProbe::new(10, 0);

        let err = RetentionPolicy::new(10, 1000)
            .enforce(dir.path(), PREFIX, Some(&files[1]), &probe)
            .unwrap_err();

        assert!(matches!(
            err,
            IcePlantError::DiskExhausted {
                available: 10,
                required: 1000
            }
        ));
        assert!(!files[0].exists());
        assert!(files[1].exists());
    }

    #[test]
    fn test_zero_floor_never_probes() {
        struct PanickingProbe;
        impl SpaceProbe for PanickingProbe {
            fn available(&self, _dir: &Path) -> io::Result<u64> {
                panic!("probe should not be called");
            }
        }

        let dir = ScratchDir::new("retention-noprobe");
        make_files(&dir, &["20240101_00"]);
        RetentionPolicy::new(5, 0)
            .enforce(dir.path(), PREFIX, None, &PanickingProbe)
            .unwrap();
    }
}
