//! Delivery of one envelope to one server.
//!
//! The dispatch loop only needs a synchronous "send this envelope to that
//! endpoint and wait" primitive, captured by [`Transport`]. [`TcpTransport`] is
//! the production implementation; tests plug in scripted ones.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

use crate::envelope::RequestEnvelope;
use crate::roster::Endpoint;
use crate::wire::{self, Reply};

/// Failure to obtain any usable reply from a server.
///
/// The dispatch loop treats every variant the same way: the server is assumed
/// unreachable and the next one is tried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("request to {endpoint} failed: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        let source = match self {
            TransportError::Connect { source, .. } | TransportError::Io { source, .. } => source,
        };
        matches!(
            source.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        )
    }
}

/// Sends an envelope to an endpoint and waits for the reply.
pub trait Transport: Send + Sync {
    fn attempt(&self, endpoint: &Endpoint, envelope: &RequestEnvelope)
    -> Result<Reply, TransportError>;
}

/// One TCP connection per attempt, framed with [`wire`].
///
/// Attempts are rare compared to the cost of a consensus round on the server,
/// so connections are not pooled.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl TcpTransport {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

    /// `io_timeout` of `None` waits for a reply indefinitely.
    pub fn new(connect_timeout: Duration, io_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }

    fn exchange(&self, stream: &mut TcpStream, envelope: &RequestEnvelope) -> io::Result<Reply> {
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        stream.set_nodelay(true)?;
        wire::send(stream, envelope)?;
        wire::recv(stream)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONNECT_TIMEOUT, Some(Self::DEFAULT_IO_TIMEOUT))
    }
}

impl Transport for TcpTransport {
    fn attempt(
        &self,
        endpoint: &Endpoint,
        envelope: &RequestEnvelope,
    ) -> Result<Reply, TransportError> {
        let mut stream = TcpStream::connect_timeout(&endpoint.addr(), self.connect_timeout)
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        self.exchange(&mut stream, envelope)
            .map_err(|source| TransportError::Io {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}
