//! Streaming frame extractor.
//!
//! Accumulates bytes from link reads in a [`ReadBuffer`] and cuts out
//! complete candidate frames. Implements a state machine so that a frame split
//! at any byte boundary (inside a marker, a doubled `DLE` or the CRC) resumes
//! on the next push without rescanning:
//! - `SeekingStart`: looking for `DLE STX`
//! - `InFrame`: buffer starts at a start marker, interior scanned up to `scan`
//! - `AwaitingCrc`: end marker found, need the two CRC bytes
//!
//! # Example
//!
//! ```
//! use iceplant::protocol::{build_frame, FrameExtractor};
//!
//! let mut extractor = FrameExtractor::new();
//! let bytes = build_frame(b"G");
//!
//! assert!(extractor.push(&bytes[..3]).is_empty());
//! let frames = extractor.push(&bytes[3..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].as_bytes(), &bytes[..]);
//! ```

use tracing::debug;

use super::read_buffer::ReadBuffer;
use super::wire_format::{CRC_SIZE, DLE, END_MARKER, ETX, START_MARKER, STX};
use super::CandidateFrame;

/// Default bound on an unterminated frame before its start marker is abandoned.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// State machine for frame extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No start marker at the front of the buffer.
    SeekingStart,
    /// Buffer starts with a start marker; `scan` is the next unexamined
    /// interior offset and always sits on an escape-consistent boundary.
    InFrame { scan: usize },
    /// End marker begins at offset `end`; waiting for the CRC bytes.
    AwaitingCrc { end: usize },
}

/// Stateful scanner turning a fragmentary byte stream into candidate frames.
#[derive(Debug)]
pub struct FrameExtractor {
    /// Unconsumed bytes from the link.
    buffer: ReadBuffer,
    /// Current parsing state.
    state: State,
    /// Maximum length of a frame still waiting for its end marker.
    max_frame_len: usize,
    /// Frames abandoned because they grew past `max_frame_len`.
    overflows: u64,
    /// Frames cut short by a new start marker.
    resyncs: u64,
}

impl FrameExtractor {
    /// Create an extractor with default settings.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create an extractor with a custom bound on unterminated frames.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: ReadBuffer::new(),
            state: State::SeekingStart,
            max_frame_len: max_frame_len.max(START_MARKER.len() + END_MARKER.len()),
            overflows: 0,
            resyncs: 0,
        }
    }

    /// Push data into the buffer and extract all complete candidate frames.
    ///
    /// Returns an empty vector if the data so far holds no complete frame;
    /// the incomplete tail is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<CandidateFrame> {
        self.buffer.append(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract a single frame, returning `None` when more bytes are needed.
    fn try_extract_one(&mut self) -> Option<CandidateFrame> {
        loop {
            match self.state {
                State::SeekingStart => {
                    let buf = self.buffer.as_slice();
                    match find_start_marker(buf) {
                        Some(start) => {
                            self.buffer.discard(start);
                            self.state = State::InFrame {
                                scan: START_MARKER.len(),
                            };
                        }
                        None => {
                            // A trailing DLE may be the first half of a split start marker.
                            let keep = usize::from(buf.last() == Some(&DLE));
                            let drop = buf.len() - keep;
                            self.buffer.discard(drop);
                            return None;
                        }
                    }
                }

                State::InFrame { scan } => match self.scan_interior(scan) {
                    Some(state) => self.state = state,
                    None => return None,
                },

                State::AwaitingCrc { end } => {
                    let frame_len = end + END_MARKER.len() + CRC_SIZE;
                    if self.buffer.len() < frame_len {
                        return None;
                    }

                    let bytes = self.buffer.take_frame(frame_len);
                    self.state = State::SeekingStart;
                    return Some(CandidateFrame::new(bytes));
                }
            }
        }
    }

    /// Scan the interior of the frame at the front of the buffer.
    ///
    /// Returns the next state to process, or `None` (after saving the scan
    /// position) when the buffer runs out.
    fn scan_interior(&mut self, mut scan: usize) -> Option<State> {
        loop {
            if scan > self.max_frame_len {
                debug!(
                    "Abandoning unterminated frame after {} bytes",
                    self.max_frame_len
                );
                self.overflows += 1;
                self.buffer.discard(START_MARKER.len());
                return Some(State::SeekingStart);
            }

            let buf = self.buffer.as_slice();
            let Some(&byte) = buf.get(scan) else {
                self.state = State::InFrame { scan };
                return None;
            };

            if byte != DLE {
                scan += 1;
                continue;
            }

            let Some(&next) = buf.get(scan + 1) else {
                self.state = State::InFrame { scan };
                return None;
            };

            match next {
                DLE => scan += 2,
                ETX => return Some(State::AwaitingCrc { end: scan }),
                STX => {
                    debug!("Start marker inside frame, resynchronising");
                    self.resyncs += 1;
                    self.buffer.discard(scan);
                    scan = START_MARKER.len();
                }
                // Stray escape; left for the validator to reject.
                _ => scan += 1,
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// View the unconsumed bytes.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Total bytes dropped as unreachable noise.
    pub fn discarded_bytes(&self) -> u64 {
        self.buffer.discarded()
    }

    /// Frames abandoned for exceeding the length bound.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Frames cut short by a new start marker.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::SeekingStart;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::SeekingStart => "SeekingStart",
            State::InFrame { .. } => "InFrame",
            State::AwaitingCrc { .. } => "AwaitingCrc",
        }
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn find_start_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(START_MARKER.len())
        .position(|window| window == START_MARKER)
}
