//! Protocol module - wire format, framing, and frame validation.
//!
//! This module implements the monitor's serial framing:
//! - `DLE STX ... DLE ETX` envelope with `DLE` stuffing and a CRC-16 trailer
//! - Read buffer and extractor for accumulating partial reads
//! - Candidate frames, the validator and the outbound command builder

mod frame;
mod frame_buffer;
mod read_buffer;
mod wire_format;

pub use frame::{build_frame, validate, CandidateFrame, Command, Rejection};
pub use frame_buffer::{FrameExtractor, DEFAULT_MAX_FRAME_LEN};
pub use read_buffer::ReadBuffer;
pub use wire_format::{
    crc16, escape, trailing_crc, unescape, unescape_strict, CRC_SIZE, DLE, END_MARKER, ETX,
    MIN_FRAME_SIZE, START_MARKER, STX,
};
