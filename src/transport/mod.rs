//! Transport module - the byte link to the monitor.
//!
//! Provides:
//! - [`Link`] - bounded-read, fire-and-forget-write byte link
//! - [`StreamLink`] - a [`Link`] over any tokio `AsyncRead + AsyncWrite`
//! - [`open_serial`] - the serial port as a [`StreamLink`]

mod serial;
mod stream;

use std::time::Duration;

use crate::error::Result;

pub use serial::{open_serial, serial_builder};
pub use stream::StreamLink;

/// Byte link driven by the acquisition loop.
///
/// Every I/O failure is reported as
/// [`IcePlantError::LinkUnavailable`](crate::error::IcePlantError::LinkUnavailable)
/// so the loop can log it and carry on.
#[allow(async_fn_in_trait)]
pub trait Link {
    /// Write all of `bytes`. No acknowledgement is awaited.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever arrives within `timeout` into `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}
