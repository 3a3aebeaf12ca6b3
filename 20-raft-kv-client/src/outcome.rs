//! Classification of a single network attempt.

use crate::envelope::OpKind;
use crate::transport::TransportError;
use crate::wire::{Reply, STATUS_NO_KEY, STATUS_OK, STATUS_WRONG_LEADER};

/// What one attempt against one server produced.
#[derive(Debug)]
pub enum ResponseOutcome {
    /// The server executed the request. Writes carry an empty value.
    Success(String),
    /// The key does not exist on the leader.
    KeyNotFound,
    /// The server is a follower.
    WrongLeader,
    /// No usable reply arrived.
    TransportFailure(TransportError),
    /// The reply's status is empty or unknown to this client.
    ProtocolViolation(String),
}

impl ResponseOutcome {
    pub fn classify(result: Result<Reply, TransportError>) -> Self {
        match result {
            Ok(reply) => Self::from_reply(reply),
            Err(err) => ResponseOutcome::TransportFailure(err),
        }
    }

    pub fn from_reply(reply: Reply) -> Self {
        match reply.status.as_str() {
            STATUS_OK => ResponseOutcome::Success(reply.value),
            STATUS_NO_KEY => ResponseOutcome::KeyNotFound,
            STATUS_WRONG_LEADER => ResponseOutcome::WrongLeader,
            _ => ResponseOutcome::ProtocolViolation(reply.status),
        }
    }

    /// Decides what the dispatch loop does next for an operation of `kind`.
    ///
    /// `ErrNoKey` only makes sense for reads; a write answered that way is a
    /// protocol violation like any unknown status.
    pub fn verdict(self, kind: OpKind) -> Verdict {
        match self {
            ResponseOutcome::Success(value) => Verdict::Found(value),
            ResponseOutcome::KeyNotFound if kind == OpKind::Get => Verdict::NotFound,
            ResponseOutcome::KeyNotFound => Verdict::Fatal(STATUS_NO_KEY.to_string()),
            ResponseOutcome::WrongLeader | ResponseOutcome::TransportFailure(_) => {
                Verdict::Rotate
            }
            ResponseOutcome::ProtocolViolation(status) => Verdict::Fatal(status),
        }
    }
}

/// The dispatch loop's next move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Terminal: return this value.
    Found(String),
    /// Terminal: return the not-found sentinel.
    NotFound,
    /// Advance the leader hint and try again.
    Rotate,
    /// Terminal: abort the call, carrying the offending status.
    Fatal(String),
}
