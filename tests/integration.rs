//! Integration tests for iceplant.
//!
//! These tests drive the public API end to end: wire bytes through the
//! extractor and validator, the log writer against a real directory, and the
//! acquisition loop against the simulated monitor.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, TimeZone, Utc};

use iceplant::clock::ManualClock;
use iceplant::codec::{LogRecord, CSV_HEADER};
use iceplant::logbook::{LogWriter, LogWriterConfig, RetentionPolicy};
use iceplant::protocol::{build_frame, crc16, Command, FrameExtractor, Rejection};
use iceplant::sim::{SimulatedMonitor, SimulatorConfig, BLOCK_LEN};
use iceplant::viewer::{Viewer, ViewerOptions};
use iceplant::{Acquisition, LinkState};

/// Unique scratch directory, removed on drop.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "iceplant-it-{}-{}-{:x}",
            label,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn set_age(path: &Path, secs_ago: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .unwrap();
}

fn local(hour: u32, minute: u32) -> DateTime<Utc> {
    Local
        .with_ymd_and_hms(2024, 6, 15, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn writer_config(dir: &Path, max_files: usize) -> LogWriterConfig {
    LogWriterConfig {
        data_dir: dir.to_path_buf(),
        file_prefix: "ctg_frames_".into(),
        retention: RetentionPolicy::new(max_files, 0),
    }
}

/// A corrupted poll frame followed by a valid auto-send frame.
#[test]
fn test_corrupted_then_valid_frame() {
    let mut corrupted = Command::Poll.encode();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;

    let mut stream = corrupted;
    stream.extend(Command::AutoSend.encode());

    let mut extractor = FrameExtractor::new();
    let frames = extractor.push(&stream);
    assert_eq!(frames.len(), 2);

    assert!(matches!(
        frames[0].validate(),
        Err(Rejection::CrcMismatch { .. })
    ));
    assert_eq!(&frames[1].validate().unwrap()[..], b"G");
    assert!(extractor.is_empty());
}

/// Wire bytes of the two commands are exactly as the monitor expects.
#[test]
fn test_command_wire_bytes() {
    let poll = Command::Poll.encode();
    assert_eq!(&poll[..6], &[0x10, 0x02, b'?', b'C', 0x10, 0x03]);
    assert_eq!(poll[6..], crc16(&poll[..6]).to_be_bytes());

    let auto = Command::AutoSend.encode();
    assert_eq!(&auto[..5], &[0x10, 0x02, b'G', 0x10, 0x03]);
    assert_eq!(auto.len(), 7);
}

/// Feeding a stream in every possible two-piece split yields the same payloads.
#[test]
fn test_every_split_point_yields_same_payloads() {
    let payloads: [&[u8]; 3] = [
        b"S\x80\x00",
        &[0x10, 0x10, 0x03, 0x02],
        &[0x21, 0x10, 0x04, 0x00],
    ];
    let mut stream = vec![0xAA, 0x10];
    for payload in payloads {
        stream.extend(build_frame(payload));
    }

    for split in 0..=stream.len() {
        let mut extractor = FrameExtractor::new();
        let mut frames = extractor.push(&stream[..split]);
        frames.extend(extractor.push(&stream[split..]));

        let decoded: Vec<Vec<u8>> = frames
            .iter()
            .map(|f| f.validate().unwrap().to_vec())
            .collect();
        let expected: Vec<Vec<u8>> = payloads.iter().map(|p| p.to_vec()).collect();
        assert_eq!(decoded, expected, "split at {}", split);
    }
}

/// Opening a new hour with three old files and room for two keeps two.
#[test]
fn test_retention_on_open_keeps_max_files() {
    let dir = ScratchDir::new("retention");
    let old: Vec<PathBuf> = ["20240614_01", "20240614_02", "20240614_03"]
        .iter()
        .enumerate()
        .map(|(i, hour)| {
            let path = dir.path().join(format!("ctg_frames_{}.csv", hour));
            fs::write(&path, format!("{}\n", CSV_HEADER)).unwrap();
            set_age(&path, (3 - i as u64) * 3600);
            path
        })
        .collect();

    let mut writer = LogWriter::new(writer_config(dir.path(), 2));
    writer.open_bucket(&local(8, 0)).unwrap();

    assert!(!old[0].exists());
    assert!(!old[1].exists());
    assert!(old[2].exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);

    writer.close().unwrap();
}

/// Records written by the writer are what the viewer plots.
#[test]
fn test_viewer_reads_writer_output() {
    let dir = ScratchDir::new("viewer");
    let mut writer = LogWriter::new(writer_config(dir.path(), 10));
    writer.open_bucket(&local(9, 0)).unwrap();
    for value in [0x00u8, 0x7F, 0xFF] {
        let record = LogRecord::new(1.0, bytes::Bytes::from(vec![b'S', value]));
        writer.append(&record).unwrap();
    }

    let mut viewer = Viewer::new(ViewerOptions {
        data_dir: dir.path().to_path_buf(),
        byte_index: 1,
        from_start: true,
        ..ViewerOptions::default()
    });
    let samples = viewer.poll().unwrap();

    let values: Vec<u8> = samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![0x00, 0x7F, 0xFF]);
    assert_eq!(viewer.sparkline().render(), " =@");
}

/// The acquisition loop against the simulated monitor logs whole blocks.
#[tokio::test(start_paused = true)]
async fn test_acquisition_with_simulated_monitor() {
    let dir = ScratchDir::new("simulate");
    let clock = ManualClock::new(local(10, 30));
    let monitor = SimulatedMonitor::new(SimulatorConfig {
        corrupt_every: 3,
        max_chunk: 7,
        seed: Some(7),
        ..SimulatorConfig::default()
    });

    let mut acquisition = Acquisition::new(
        monitor,
        clock.clone(),
        LogWriter::new(writer_config(dir.path(), 10)),
        Default::default(),
    );

    for _ in 0..500 {
        if acquisition.stats().payloads_logged >= 6 {
            break;
        }
        acquisition.step().await.unwrap();
    }
    assert_eq!(acquisition.state(), LinkState::Auto);

    let path = acquisition.writer().current_path().unwrap().to_path_buf();
    let stats = acquisition.run(async {}).await.unwrap();

    assert!(stats.payloads_logged >= 6);
    assert!(stats.crc_mismatches >= 2);
    assert_eq!(stats.malformed, 0);
    assert!(!acquisition.writer().is_open());

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    let records: Vec<LogRecord> = lines.map(|l| LogRecord::parse_row(l).unwrap()).collect();
    assert_eq!(records.len() as u64, stats.payloads_logged);
    for record in &records {
        assert_eq!(record.payload_len, BLOCK_LEN);
        assert_eq!(&record.payload[..3], &[b'S', 0x80, 0x00]);
        assert_eq!(&record.payload[BLOCK_LEN - 4..], &[0x21, 0x10, 0x04, 0x00]);
    }
    assert!(path.to_string_lossy().ends_with("ctg_frames_20240615_10.csv"));
}
