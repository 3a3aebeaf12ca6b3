//! Leader discovery and the retry loop.
//!
//! A [`Dispatcher`] delivers one [`RequestEnvelope`] to the cluster and returns
//! its authoritative outcome. It keeps a shared guess of which roster entry is
//! the leader and walks the roster round-robin whenever that guess is proven
//! wrong:
//!
//! ```text
//!   ┌──────────► Attempt(roster[hint]) ──► Evaluate ──┬─► Found / NotFound
//!   │                                                 ├─► Fatal
//!   └── Rotate (hint = hint + 1 mod len) ◄────────────┘   (WrongLeader, transport failure)
//! ```
//!
//! Replies carry no leader id, so rotation is purely positional. Resending the
//! same envelope is safe because servers deduplicate writes by
//! `(client id, serial)`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, error, warn};

use crate::envelope::RequestEnvelope;
use crate::error::ClientError;
use crate::outcome::{ResponseOutcome, Verdict};
use crate::retry::{CancelToken, RetryPolicy};
use crate::roster::ServerRoster;
use crate::transport::Transport;
use crate::wire::{self, MAX_FRAME_LEN};

/// Index of the server currently believed to be leader.
///
/// Shared by every in-flight call on a client. Two calls rotating at the same
/// time may skip a server, but the index always stays within the roster.
#[derive(Debug)]
struct LeaderHint {
    index: AtomicUsize,
    len: usize,
}

impl LeaderHint {
    fn new(len: usize) -> Self {
        Self {
            index: AtomicUsize::new(0),
            len,
        }
    }

    fn current(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    fn rotate(&self) {
        let len = self.len;
        let _ = self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len));
    }
}

/// Delivers envelopes to the cluster, retrying until a terminal outcome.
pub struct Dispatcher {
    roster: ServerRoster,
    hint: LeaderHint,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    cancel: CancelToken,
}

impl Dispatcher {
    pub fn new(
        roster: ServerRoster,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        cancel: CancelToken,
    ) -> Self {
        let hint = LeaderHint::new(roster.len());
        Self {
            roster,
            hint,
            transport,
            policy,
            cancel,
        }
    }

    pub fn roster(&self) -> &ServerRoster {
        &self.roster
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Roster index of the server the next attempt will go to.
    pub fn leader_hint(&self) -> usize {
        self.hint.current()
    }

    /// Sends `envelope` until the cluster gives a terminal answer.
    ///
    /// Returns `Ok(Some(value))` on success (writes yield an empty value) and
    /// `Ok(None)` when a `Get` finds no key. Transport failures and wrong-leader
    /// replies are retried against the next server; with the default policy the
    /// call blocks until some server answers authoritatively.
    ///
    /// # Errors
    /// - [`ClientError::ProtocolViolation`] as soon as a server answers with an
    ///   unrecognised status. The call is not retried.
    /// - [`ClientError::RequestTooLarge`] / [`ClientError::Encode`] before any
    ///   server is contacted, when the envelope cannot be sent at all.
    /// - [`ClientError::RetriesExhausted`] / [`ClientError::Cancelled`] only
    ///   when the policy or token allows it.
    pub fn dispatch(&self, envelope: &RequestEnvelope) -> Result<Option<String>, ClientError> {
        self.check_sendable(envelope)?;

        let mut attempts: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(envelope, attempts));
            }

            let server = self.hint.current();
            let endpoint = self.roster.get(server);
            attempts = attempts.saturating_add(1);
            let outcome = ResponseOutcome::classify(self.transport.attempt(endpoint, envelope));

            match outcome {
                ResponseOutcome::TransportFailure(ref err) => warn!(
                    client = %envelope.client_id(),
                    serial = %envelope.serial(),
                    kind = %envelope.kind(),
                    server,
                    endpoint = %endpoint,
                    error = %err,
                    "attempt failed, trying next server"
                ),
                ResponseOutcome::WrongLeader => debug!(
                    client = %envelope.client_id(),
                    serial = %envelope.serial(),
                    server,
                    endpoint = %endpoint,
                    "server is not the leader, trying next server"
                ),
                _ => {}
            }

            match outcome.verdict(envelope.kind()) {
                Verdict::Found(value) => {
                    debug!(
                        client = %envelope.client_id(),
                        serial = %envelope.serial(),
                        kind = %envelope.kind(),
                        key = envelope.key(),
                        server,
                        attempts,
                        "request completed"
                    );
                    return Ok(Some(value));
                }
                Verdict::NotFound => {
                    debug!(
                        client = %envelope.client_id(),
                        serial = %envelope.serial(),
                        key = envelope.key(),
                        server,
                        attempts,
                        "key not found"
                    );
                    return Ok(None);
                }
                Verdict::Fatal(status) => {
                    error!(
                        client = %envelope.client_id(),
                        serial = %envelope.serial(),
                        kind = %envelope.kind(),
                        key = envelope.key(),
                        server,
                        endpoint = %endpoint,
                        status = %status,
                        "server replied with an unrecognised status, aborting request"
                    );
                    return Err(ClientError::ProtocolViolation {
                        server,
                        endpoint: endpoint.to_string(),
                        kind: envelope.kind(),
                        key: envelope.key().to_string(),
                        serial: envelope.serial(),
                        status,
                    });
                }
                Verdict::Rotate => {
                    self.hint.rotate();
                }
            }

            if self.policy.attempts_exhausted(attempts) {
                warn!(
                    client = %envelope.client_id(),
                    serial = %envelope.serial(),
                    kind = %envelope.kind(),
                    attempts,
                    "giving up after reaching the attempt limit"
                );
                return Err(ClientError::RetriesExhausted {
                    kind: envelope.kind(),
                    key: envelope.key().to_string(),
                    attempts,
                });
            }

            let delay = self.policy.delay_after(attempts, self.roster.len());
            if !delay.is_zero() {
                debug!(
                    serial = %envelope.serial(),
                    delay_ms = delay.as_millis() as u64,
                    "no server answered this sweep, backing off"
                );
            }
            if self.cancel.sleep(delay) {
                return Err(self.cancelled(envelope, attempts));
            }
        }
    }

    /// Rejects envelopes that would fail identically against every server.
    fn check_sendable(&self, envelope: &RequestEnvelope) -> Result<(), ClientError> {
        let len = wire::encoded_len(envelope).map_err(|source| ClientError::Encode {
            kind: envelope.kind(),
            key: envelope.key().to_string(),
            source,
        })?;
        if len > MAX_FRAME_LEN as u64 {
            error!(
                client = %envelope.client_id(),
                serial = %envelope.serial(),
                kind = %envelope.kind(),
                len,
                limit = MAX_FRAME_LEN,
                "request exceeds the frame limit"
            );
            return Err(ClientError::RequestTooLarge {
                kind: envelope.kind(),
                key: envelope.key().to_string(),
                len,
                limit: MAX_FRAME_LEN,
            });
        }
        Ok(())
    }

    fn cancelled(&self, envelope: &RequestEnvelope, attempts: u64) -> ClientError {
        debug!(serial = %envelope.serial(), attempts, "request cancelled");
        ClientError::Cancelled {
            kind: envelope.kind(),
            key: envelope.key().to_string(),
            attempts,
        }
    }
}
