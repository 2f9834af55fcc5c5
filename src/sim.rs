//! Simulated monitor for running without hardware.
//!
//! [`SimulatedMonitor`] is a [`Link`] that behaves like the real device: it
//! answers each `?C` poll with one data block, and after `G` it sends one
//! block per interval on its own. Blocks are delivered in random-sized
//! pieces so the extractor sees split frames, and every `corrupt_every`-th
//! block can be sent with a broken checksum.
//!
//! Block payload layout (35 bytes):
//!
//! ```text
//! 'S' 0x80 0x00 | HR1 x4 | HR2 x4 | MHR x4 | TOCO x4 | 0x21 0x10 0x04 0x00
//! ```
//!
//! Each heart-rate sample is two bytes: `value = bpm / 0.25` (0..=1200), high
//! byte `value >> 8` in bits 0-2 with the signal quality in bits 5-6, low
//! byte `value & 0xff`. The `0x10` in the trailer is stuffed on the wire.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::codec::epoch_seconds;
use crate::error::Result;
use crate::protocol::{build_frame, Command, FrameExtractor};
use crate::transport::Link;

/// Samples per second of every series.
pub const SAMPLE_RATE: f64 = 4.0;

/// Samples per series in one block.
pub const SAMPLES_PER_BLOCK: usize = 4;

/// Payload length of one block.
pub const BLOCK_LEN: usize = 3 + 3 * SAMPLES_PER_BLOCK * 2 + SAMPLES_PER_BLOCK + 4;

/// Default time between auto-sent blocks.
pub const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for the simulated monitor.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time between auto-sent blocks.
    pub block_interval: Duration,
    /// Corrupt the CRC of every n-th block. Zero never corrupts.
    pub corrupt_every: u64,
    /// Largest piece handed out by a single read.
    pub max_chunk: usize,
    /// Seed for the noise source. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            block_interval: DEFAULT_BLOCK_INTERVAL,
            corrupt_every: 0,
            max_chunk: 16,
            seed: None,
        }
    }
}

/// A [`Link`] that plays the monitor's side of the protocol.
pub struct SimulatedMonitor {
    config: SimulatorConfig,
    inbound: FrameExtractor,
    outbound: VecDeque<u8>,
    rng: StdRng,
    auto: bool,
    next_block: Option<Instant>,
    blocks_sent: u64,
    started: Instant,
    epoch_offset: f64,
}

impl SimulatedMonitor {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            inbound: FrameExtractor::new(),
            outbound: VecDeque::new(),
            rng,
            auto: false,
            next_block: None,
            blocks_sent: 0,
            started: Instant::now(),
            epoch_offset: epoch_seconds(&Utc::now()),
        }
    }

    /// Whether `G` has been received.
    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Blocks queued so far, poll responses included.
    pub fn blocks_sent(&self) -> u64 {
        self.blocks_sent
    }

    /// Bytes queued but not yet read.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Build one block payload for time `t` (seconds).
    pub fn block_payload(&mut self, t: f64) -> Vec<u8> {
        let mut payload = Vec::with_capacity(BLOCK_LEN);
        payload.push(b'S');
        payload.extend_from_slice(&[0x80, 0x00]);

        let series = [
            (140.0, 8.0, 0.03, 0.0, 2),
            (130.0, 6.0, 0.035, 1.2, 1),
            (80.0, 4.0, 0.02, 2.4, 2),
        ];
        for (base, amp, drift, phase, quality) in series {
            for i in 0..SAMPLES_PER_BLOCK {
                let ts = t + i as f64 / SAMPLE_RATE;
                let bpm = base
                    + amp * (ts * 2.0 * PI * drift + phase).sin()
                    + self.rng.gen_range(-2.0..2.0);
                payload.extend_from_slice(&encode_hr_sample(bpm.clamp(60.0, 200.0), quality, 0));
            }
        }

        for i in 0..SAMPLES_PER_BLOCK {
            let ts = t + i as f64 / SAMPLE_RATE;
            let wave = 10.0 * (ts * 2.0 * PI * 0.02).sin();
            let bump = if (ts as u64) % 90 < 10 {
                30.0 * ((ts % 10.0) * PI / 10.0).sin()
            } else {
                0.0
            };
            let toco = (10.0 + wave + bump + self.rng.gen_range(-1.0..1.0)).clamp(0.0, 127.0);
            payload.push(toco.round() as u8);
        }

        payload.extend_from_slice(&[0x21, 0x10, 0x04, 0x00]);
        payload
    }

    fn queue_block(&mut self) {
        let t = self.epoch_offset + self.started.elapsed().as_secs_f64();
        let payload = self.block_payload(t);
        let mut frame = build_frame(&payload);
        self.blocks_sent += 1;

        if self.config.corrupt_every > 0 && self.blocks_sent % self.config.corrupt_every == 0 {
            let last = frame.len() - 1;
            frame[last] ^= 0x5A;
            tracing::debug!(block = self.blocks_sent, "Simulator corrupting block");
        }
        self.outbound.extend(frame);
    }

    fn take_chunk(&mut self, buf: &mut [u8]) -> usize {
        let max = self.config.max_chunk.max(1);
        let want = self.rng.gen_range(1..=max);
        let n = want.min(buf.len()).min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl Link for SimulatedMonitor {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        for frame in self.inbound.push(bytes) {
            let Ok(payload) = frame.validate() else {
                tracing::debug!("Simulator ignoring invalid command frame");
                continue;
            };

            if payload[..] == *Command::Poll.payload() {
                self.queue_block();
            } else if payload[..] == *Command::AutoSend.payload() {
                if !self.auto {
                    tracing::info!("Simulator auto-send enabled");
                }
                self.auto = true;
                self.next_block
                    .get_or_insert_with(|| Instant::now() + self.config.block_interval);
            } else {
                tracing::debug!(len = payload.len(), "Simulator ignoring unknown command");
            }
        }
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.outbound.is_empty() {
            let deadline = Instant::now() + timeout;
            match self.next_block {
                Some(due) if due <= deadline => {
                    tokio::time::sleep_until(due).await;
                    self.next_block = Some(due + self.config.block_interval);
                    self.queue_block();
                }
                _ => {
                    tokio::time::sleep_until(deadline).await;
                    return Ok(0);
                }
            }
        }

        Ok(self.take_chunk(buf))
    }
}

/// Encode one heart-rate sample.
pub fn encode_hr_sample(bpm: f64, quality: u8, fmp: u8) -> [u8; 2] {
    let value = (bpm / 0.25).round().clamp(0.0, 1200.0) as u16;
    let hi = ((value >> 8) as u8 & 0x07) | ((quality & 0x03) << 5) | ((fmp & 0x03) << 3);
    [hi, (value & 0xFF) as u8]
}
