//! TCP transport with incremental frame extraction.
//!
//! [`TransportConnection`] owns the socket and a receive buffer. Reads are
//! drained frame by frame: [`TransportConnection::try_extract_frame`]
//! consumes nothing until a complete line is buffered, so arbitrary TCP
//! segmentation never corrupts the stream position.

use std::fmt;
use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

use crate::protocol::{Frame, FrameError};

const READ_CHUNK: usize = 4096;

/// Transport failure categories, each with a human-readable description
/// surfaced in the caller's log stream before the generic error outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    /// The daemon closed the connection.
    RemoteClosed,
    /// The daemon address did not resolve.
    HostNotFound,
    /// Nothing is listening at the daemon address.
    ConnectionRefused,
    /// The system is out of socket resources.
    ResourceExhausted,
    /// Any other socket fault, described verbatim.
    Other(String),
}

impl TransportErrorKind {
    /// Maps an I/O error onto its transport category.
    pub(crate) fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportErrorKind::RemoteClosed,
            _ => match err.raw_os_error() {
                // ENFILE / EMFILE
                Some(23) | Some(24) => TransportErrorKind::ResourceExhausted,
                _ => TransportErrorKind::Other(err.to_string()),
            },
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::RemoteClosed => write!(f, "Remote host connection closed"),
            TransportErrorKind::HostNotFound => write!(f, "Host not found"),
            TransportErrorKind::ConnectionRefused => write!(
                f,
                "Connection refused, make sure the daemon is running at the given address and port"
            ),
            TransportErrorKind::ResourceExhausted => write!(
                f,
                "No more available sockets on this system, please retry later or close some of them"
            ),
            TransportErrorKind::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Opens a TCP connection to the daemon, classifying every failure.
pub(crate) async fn open_connection(
    address: String,
    port: u16,
) -> Result<TcpStream, TransportErrorKind> {
    let mut resolved = lookup_host((address.as_str(), port))
        .await
        .map_err(|_| TransportErrorKind::HostNotFound)?;
    let target = resolved.next().ok_or(TransportErrorKind::HostNotFound)?;

    TcpStream::connect(target)
        .await
        .map_err(|err| TransportErrorKind::classify(&err))
}

/// An established daemon connection plus its incremental read buffer.
#[derive(Debug)]
pub(crate) struct TransportConnection {
    stream: TcpStream,
    rx_buf: Vec<u8>,
}

impl TransportConnection {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            rx_buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Reads more bytes into the buffer. Returns the number of bytes read;
    /// zero means the remote side closed the connection.
    pub(crate) async fn read_more(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.stream.read(&mut chunk).await?;
        self.rx_buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Attempts to extract exactly one complete frame from the buffer.
    ///
    /// Returns `None` when no complete line is buffered yet; in that case
    /// nothing is consumed. A complete but malformed line is consumed and
    /// reported, so a bad frame cannot wedge the stream.
    pub(crate) fn try_extract_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        let newline = self.rx_buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.rx_buf.drain(..=newline).collect();
        Some(Frame::decode(&line[..newline]))
    }

    /// Writes and flushes one encoded frame.
    pub(crate) async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Issues a graceful shutdown of the write half. The caller treats a
    /// failure as a logged non-fatal anomaly, never a propagated error.
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
