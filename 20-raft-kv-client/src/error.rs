use std::io;

use thiserror::Error;

use crate::envelope::{OpKind, Serial};

/// Errors a caller of [`KvClient`](crate::client::KvClient) can observe.
///
/// Transport failures and wrong-leader replies never appear here: the dispatch
/// loop absorbs them by rotating to the next server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The roster is not a valid consensus cluster size.
    #[error("server roster must hold an odd number of at least 3 endpoints, got {len}")]
    InvalidRoster { len: usize },

    /// A configured server could not be resolved to a socket address.
    #[error("failed to resolve server {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A server answered with a status this client does not recognise.
    ///
    /// The outcome of a write is unknown at this point, so the call is aborted
    /// rather than retried or reported as success.
    #[error(
        "protocol violation: server {server} ({endpoint}) answered {kind} key={key:?} serial={serial} with status {status:?}"
    )]
    ProtocolViolation {
        server: usize,
        endpoint: String,
        kind: OpKind,
        key: String,
        serial: Serial,
        status: String,
    },

    /// The encoded request would not fit in one frame. No server was contacted.
    #[error("{kind} key={key:?} encodes to {len} bytes, over the {limit} byte frame limit")]
    RequestTooLarge {
        kind: OpKind,
        key: String,
        len: u64,
        limit: usize,
    },

    /// The request could not be encoded. No server was contacted.
    #[error("failed to encode {kind} key={key:?}")]
    Encode {
        kind: OpKind,
        key: String,
        #[source]
        source: io::Error,
    },

    /// The client's cancellation token fired before a terminal outcome.
    #[error("{kind} key={key:?} cancelled after {attempts} attempts")]
    Cancelled {
        kind: OpKind,
        key: String,
        attempts: u64,
    },

    /// The retry policy's attempt cap was reached.
    #[error("{kind} key={key:?} gave up after {attempts} attempts")]
    RetriesExhausted {
        kind: OpKind,
        key: String,
        attempts: u64,
    },
}

impl ClientError {
    /// True for the errors that abort a call because of a misbehaving server.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ClientError::ProtocolViolation { .. })
    }
}
