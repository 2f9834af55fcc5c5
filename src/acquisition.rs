//! Acquisition loop.
//!
//! The [`Acquisition`] owns the link, the clock, the frame extractor and the
//! log writer, and drives them through two states:
//!
//! 1. [`LinkState::Polling`] - send `?C`, wait, read. Repeats until the
//!    monitor answers with any bytes at all.
//! 2. [`LinkState::Auto`] - after one `G`, read, extract, validate and log
//!    until shutdown.
//!
//! # Example
//!
//! ```ignore
//! use iceplant::acquisition::Acquisition;
//! use iceplant::clock::SystemClock;
//! use iceplant::config::Config;
//! use iceplant::logbook::LogWriter;
//! use iceplant::transport::open_serial;
//!
//! #[tokio::main]
//! async fn main() -> iceplant::Result<()> {
//!     let config = Config::default();
//!     let link = open_serial(&config.serial)?;
//!     let writer = LogWriter::new(config.storage.writer_config());
//!     let mut acquisition =
//!         Acquisition::new(link, SystemClock, writer, config.acquisition.clone());
//!
//!     let stats = acquisition
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     println!("{:?}", stats);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::clock::Clock;
use crate::codec::LogRecord;
use crate::config::AcquisitionConfig;
use crate::error::Result;
use crate::logbook::{Fs2Probe, LogWriter, SpaceProbe};
use crate::protocol::{Command, FrameExtractor, Rejection};
use crate::transport::Link;

/// Link handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Sending poll requests until the monitor answers.
    Polling,
    /// Auto-send enabled; reading continuously.
    Auto,
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Bytes received from the link.
    pub bytes_read: u64,
    /// Candidate frames produced by the extractor.
    pub frames_seen: u64,
    /// Payloads written to the log.
    pub payloads_logged: u64,
    /// Frames rejected for a bad checksum.
    pub crc_mismatches: u64,
    /// Frames rejected for a malformed envelope.
    pub malformed: u64,
    /// Transient link failures recovered from.
    pub link_errors: u64,
    /// Poll requests sent.
    pub polls_sent: u64,
}

/// The acquisition context. All state lives here; nothing is global.
pub struct Acquisition<L, C, P: SpaceProbe = Fs2Probe> {
    link: L,
    clock: C,
    writer: LogWriter<P>,
    extractor: FrameExtractor,
    config: AcquisitionConfig,
    state: LinkState,
    stats: AcquisitionStats,
    read_buf: Vec<u8>,
    since_retention: u64,
}

impl<L, C, P> Acquisition<L, C, P>
where
    L: Link,
    C: Clock,
    P: SpaceProbe,
{
    /// Create a loop in the [`LinkState::Polling`] state. No I/O happens yet.
    pub fn new(link: L, clock: C, writer: LogWriter<P>, config: AcquisitionConfig) -> Self {
        let read_len = config.read_chunk.max(config.poll_read_chunk).max(1);
        Self {
            link,
            clock,
            writer,
            extractor: FrameExtractor::with_max_frame_len(config.max_frame_len),
            config,
            state: LinkState::Polling,
            stats: AcquisitionStats::default(),
            read_buf: vec![0u8; read_len],
            since_retention: 0,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    /// The log writer.
    pub fn writer(&self) -> &LogWriter<P> {
        &self.writer
    }

    /// The frame extractor.
    pub fn extractor(&self) -> &FrameExtractor {
        &self.extractor
    }

    /// The link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Run one read cycle to completion: poll (if polling), read once, and
    /// process whatever arrived.
    pub async fn step(&mut self) -> Result<()> {
        let never = std::future::pending::<()>();
        tokio::pin!(never);
        match self.read_cycle(never.as_mut()).await? {
            Some(n) => self.handle_bytes(n).await,
            None => Ok(()),
        }
    }

    /// Run until `shutdown` resolves or a non-transient error occurs.
    ///
    /// `shutdown` is only raced against waits and reads, so a record is never
    /// cut off mid-write. The log file is flushed and closed on every exit.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<AcquisitionStats>
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        tracing::info!(state = ?self.state, "Acquisition started");

        let outcome = self.drive(shutdown.as_mut()).await;
        let closed = self.writer.close();

        tracing::info!(
            bytes_read = self.stats.bytes_read,
            payloads_logged = self.stats.payloads_logged,
            crc_mismatches = self.stats.crc_mismatches,
            malformed = self.stats.malformed,
            link_errors = self.stats.link_errors,
            "Acquisition stopped"
        );

        settle(outcome, closed)?;
        Ok(self.stats)
    }

    async fn drive<F: Future>(&mut self, mut shutdown: Pin<&mut F>) -> Result<()> {
        loop {
            let result = match self.read_cycle(shutdown.as_mut()).await {
                Ok(None) => return Ok(()),
                Ok(Some(n)) => self.handle_bytes(n).await,
                Err(e) => Err(e),
            };

            let Err(e) = result else {
                continue;
            };
            if !e.is_transient() {
                tracing::error!("Acquisition error: {}", e);
                return Err(e);
            }

            self.stats.link_errors += 1;
            tracing::warn!("Link error: {}", e);
            tokio::select! {
                biased;
                _ = shutdown.as_mut() => return Ok(()),
                _ = self.clock.sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// Send a poll if polling, then wait and read. `Ok(None)` means shutdown
    /// won the race.
    async fn read_cycle<F: Future>(&mut self, mut shutdown: Pin<&mut F>) -> Result<Option<usize>> {
        let chunk = match self.state {
            LinkState::Polling => {
                self.link.send(&Command::Poll.encode()).await?;
                self.stats.polls_sent += 1;
                tracing::debug!(polls = self.stats.polls_sent, "Poll sent");

                tokio::select! {
                    biased;
                    _ = shutdown.as_mut() => return Ok(None),
                    _ = self.clock.sleep(self.config.poll_interval()) => {}
                }
                self.config.poll_read_chunk
            }
            LinkState::Auto => self.config.read_chunk,
        };

        let chunk = chunk.clamp(1, self.read_buf.len());
        let timeout = self.config.read_timeout();
        tokio::select! {
            biased;
            _ = shutdown.as_mut() => Ok(None),
            received = self.link.recv(&mut self.read_buf[..chunk], timeout) => received.map(Some),
        }
    }

    async fn handle_bytes(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.stats.bytes_read += n as u64;

        let frames = self.extractor.push(&self.read_buf[..n]);
        for frame in frames {
            self.stats.frames_seen += 1;
            match frame.validate() {
                Ok(payload) => self.log_payload(payload)?,
                Err(rejection) => self.count_rejection(rejection),
            }
        }

        if self.state == LinkState::Polling {
            self.link.send(&Command::AutoSend.encode()).await?;
            self.state = LinkState::Auto;
            tracing::info!(
                polls = self.stats.polls_sent,
                "Monitor answered, auto-send enabled"
            );
        }
        Ok(())
    }

    fn log_payload(&mut self, payload: Bytes) -> Result<()> {
        let now = self.clock.now();
        self.writer.rotate_if_needed(&now)?;
        self.writer.append(&LogRecord::at(&now, payload))?;
        self.stats.payloads_logged += 1;

        self.since_retention += 1;
        if self.config.retention_every > 0 && self.since_retention >= self.config.retention_every {
            self.since_retention = 0;
            let report = self.writer.enforce_retention()?;
            if !report.removed.is_empty() {
                tracing::info!(
                    removed = report.removed.len(),
                    remaining = report.remaining,
                    "Periodic retention"
                );
            }
        }
        Ok(())
    }

    fn count_rejection(&mut self, rejection: Rejection) {
        if rejection.is_crc_mismatch() {
            self.stats.crc_mismatches += 1;
        } else {
            self.stats.malformed += 1;
        }
        tracing::debug!("Rejected frame: {}", rejection);
    }
}

/// Pick the error to report when the loop ends. A loop error wins over a
/// failed close, which is then only logged.
fn settle(outcome: Result<()>, closed: Result<()>) -> Result<()> {
    match (outcome, closed) {
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "Failed to close log file after error");
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}
