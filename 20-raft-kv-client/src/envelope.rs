//! Request envelopes and the identifiers that make retries safe.
//!
//! Every logical operation becomes exactly one [`RequestEnvelope`]. The envelope
//! is tagged with the issuing client's [`ClientId`] and a [`Serial`] drawn once
//! per logical call, so the cluster can recognise a resent envelope as the same
//! intent and apply it at most once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Identity of one client instance, fixed for the lifetime of that instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Idempotency tag of one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Serial(Uuid);

impl Serial {
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The logical operations a client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Get,
    Put,
    Append,
}

impl OpKind {
    /// Whether the operation mutates the store and relies on server-side dedup.
    pub fn is_write(self) -> bool {
        matches!(self, OpKind::Put | OpKind::Append)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Get => "Get",
            OpKind::Put => "Put",
            OpKind::Append => "Append",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical operation, ready to be sent to any server in the roster.
///
/// Fields are private: once built, an envelope is only ever read, and every
/// retry of the call resends it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    kind: OpKind,
    key: String,
    value: Option<String>,
    client_id: ClientId,
    serial: Serial,
}

impl RequestEnvelope {
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The payload of a write. Always `None` for `Get`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }
}

/// Source of the two kinds of identifiers a client needs.
///
/// Implementations must be safe to call from many threads at once, and
/// `next_serial` must never return the same value twice.
pub trait IdSource: Send + Sync {
    /// A value unique to one client instance.
    fn client_id(&self) -> ClientId;

    /// A value unique to one logical operation.
    fn next_serial(&self) -> Serial;
}

/// Random v4 UUIDs for both identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn client_id(&self) -> ClientId {
        ClientId(Uuid::new_v4())
    }

    fn next_serial(&self) -> Serial {
        Serial(Uuid::new_v4())
    }
}

/// Deterministic identifiers for tests and reproducible traces.
///
/// The client id is derived from `seed`; serials count up from 1 with the seed
/// in the high 64 bits, so two sources with different seeds never collide.
#[derive(Debug)]
pub struct SequentialIds {
    seed: u64,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            next: AtomicU64::new(1),
        }
    }
}

impl IdSource for SequentialIds {
    fn client_id(&self) -> ClientId {
        ClientId(Uuid::from_u128(u128::from(self.seed) << 64))
    }

    fn next_serial(&self) -> Serial {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Serial(Uuid::from_u128((u128::from(self.seed) << 64) | u128::from(n)))
    }
}

/// Builds envelopes for a single client instance.
///
/// The client id is drawn once when the builder is created; each call to
/// [`get`](Self::get), [`put`](Self::put) or [`append`](Self::append) draws a
/// fresh serial.
#[derive(Clone)]
pub struct EnvelopeBuilder {
    client_id: ClientId,
    ids: Arc<dyn IdSource>,
}

impl EnvelopeBuilder {
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        let client_id = ids.client_id();
        Self { client_id, ids }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn get(&self, key: &str) -> RequestEnvelope {
        self.build(OpKind::Get, key, None)
    }

    pub fn put(&self, key: &str, value: &str) -> RequestEnvelope {
        self.build(OpKind::Put, key, Some(value))
    }

    pub fn append(&self, key: &str, value: &str) -> RequestEnvelope {
        self.build(OpKind::Append, key, Some(value))
    }

    fn build(&self, kind: OpKind, key: &str, value: Option<&str>) -> RequestEnvelope {
        let envelope = RequestEnvelope {
            kind,
            key: key.to_string(),
            value: value.map(str::to_string),
            client_id: self.client_id,
            serial: self.ids.next_serial(),
        };
        debug!(
            client = %envelope.client_id,
            serial = %envelope.serial,
            kind = %kind,
            key,
            "built request envelope"
        );
        envelope
    }
}

impl fmt::Debug for EnvelopeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeBuilder")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn sequential(seed: u64) -> EnvelopeBuilder {
        EnvelopeBuilder::new(Arc::new(SequentialIds::new(seed)))
    }

    #[test]
    fn test_get_carries_no_value() {
        let builder = sequential(1);
        let envelope = builder.get("foo");
        assert_eq!(envelope.kind(), OpKind::Get);
        assert_eq!(envelope.key(), "foo");
        assert_eq!(envelope.value(), None);
        assert_eq!(envelope.client_id(), builder.client_id());
    }

    #[test]
    fn test_writes_carry_value_and_kind() {
        let builder = sequential(1);
        let put = builder.put("k", "v1");
        let append = builder.append("k", "v2");
        assert_eq!(put.kind(), OpKind::Put);
        assert_eq!(put.value(), Some("v1"));
        assert_eq!(append.kind(), OpKind::Append);
        assert_eq!(append.value(), Some("v2"));
        assert!(put.kind().is_write());
        assert!(!OpKind::Get.is_write());
    }

    #[test]
    fn test_back_to_back_calls_get_fresh_serials() {
        let builder = sequential(7);
        let first = builder.put("k", "v");
        let second = builder.put("k", "v");
        assert_ne!(first.serial(), second.serial());
        assert_eq!(first.client_id(), second.client_id());
    }

    #[test]
    fn test_sequential_sources_with_different_seeds_do_not_collide() {
        let a = SequentialIds::new(1);
        let b = SequentialIds::new(2);
        assert_ne!(a.client_id(), b.client_id());
        assert_ne!(a.next_serial(), b.next_serial());
    }

    #[test]
    fn test_random_ids_differ_between_clients() {
        let first = EnvelopeBuilder::new(Arc::new(RandomIds));
        let second = EnvelopeBuilder::new(Arc::new(RandomIds));
        assert_ne!(first.client_id(), second.client_id());
    }

    #[test]
    fn test_concurrent_serials_are_unique() {
        for builder in [sequential(3), EnvelopeBuilder::new(Arc::new(RandomIds))] {
            let serials: Vec<Serial> = thread::scope(|scope| {
                let workers: Vec<_> = (0..8)
                    .map(|_| {
                        let builder = &builder;
                        scope.spawn(move || {
                            (0..200)
                                .map(|i| builder.append("k", &i.to_string()).serial())
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                workers
                    .into_iter()
                    .flat_map(|worker| worker.join().expect("worker panicked"))
                    .collect()
            });
            let unique: HashSet<_> = serials.iter().copied().collect();
            assert_eq!(unique.len(), serials.len());
        }
    }
}
