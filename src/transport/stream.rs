//! [`Link`] over a tokio byte stream.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Link;
use crate::error::{IcePlantError, Result};

/// Link over any async byte stream: a serial port, a socket, or a
/// `tokio::io::duplex` half in tests.
pub struct StreamLink<S> {
    stream: S,
    name: String,
}

impl<S> StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream`. `name` appears in error messages and logs.
    pub fn new(stream: S, name: impl Into<String>) -> Self {
        Self {
            stream,
            name: name.into(),
        }
    }

    /// Link name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a reference to the underlying stream.
    pub fn inner(&self) -> &S {
        &self.stream
    }

    /// Unwrap into the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn unavailable(&self, err: io::Error) -> IcePlantError {
        IcePlantError::LinkUnavailable(format!("{}: {}", self.name, err))
    }
}

impl<S> Link for StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.stream.write_all(bytes).await {
            return Err(self.unavailable(e));
        }
        if let Err(e) = self.stream.flush().await {
            return Err(self.unavailable(e));
        }
        tracing::trace!(link = %self.name, len = bytes.len(), "Sent");
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match tokio::time::timeout(timeout, self.stream.read(buf)).await {
            Err(_elapsed) => Ok(0),
            Ok(Ok(0)) => Err(self.unavailable(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed",
            ))),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Ok(Err(e)) => Err(self.unavailable(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_send_and_recv() {
        let (a, b) = duplex(64);
        let mut left = StreamLink::new(a, "left");
        let mut right = StreamLink::new(b, "right");

        left.send(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let n = right
            .recv(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_is_zero_bytes() {
        let (a, _b) = duplex(64);
        let mut link = StreamLink::new(a, "quiet");

        let mut buf = [0u8; 16];
        let n = link.recv(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_closed_peer_is_link_unavailable() {
        let (a, b) = duplex(64);
        drop(b);
        let mut link = StreamLink::new(a, "gone");

        let mut buf = [0u8; 16];
        let err = link
            .recv(&mut buf, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("gone"));

        let err = link.send(b"?").await.unwrap_err();
        assert!(err.is_transient());
    }
}
