//! Client for a Raft-replicated key-value store.
//!
//! The client never knows for sure which server leads the cluster. It keeps a
//! guess (the leader hint), sends each request there, and walks the server list
//! round-robin whenever a server is unreachable or answers that it is not the
//! leader. Retries are safe because every logical operation carries the
//! client's id plus a serial drawn once per call, which servers use to apply a
//! write at most once.
//!
//! # Architecture
//!
//! ```text
//!   KvClient::get / put / append
//!            │
//!            ▼
//!   EnvelopeBuilder ── (client id, fresh serial) ──► RequestEnvelope
//!            │
//!            ▼
//!   Dispatcher ── attempt ──► Transport ──► roster[leader hint]
//!       ▲   │
//!       │   └─ classify reply: return / rotate / abort
//!       └──── rotate: hint = hint + 1 mod len
//! ```
//!
//! Every call runs on the caller's thread and blocks until a terminal answer.
//! A `KvClient` can be shared between threads; they share the leader hint.
//!
//! # Modules
//!
//! - [`client`]: Public facade and builder
//! - [`envelope`]: Request envelopes, client ids, serials and identifier sources
//! - [`dispatch`]: Leader hint and the retry loop
//! - [`outcome`]: Classification of one attempt into the loop's next move
//! - [`retry`]: Optional backoff, attempt cap and cancellation
//! - [`roster`]: Server endpoints and roster validation
//! - [`transport`]: The delivery seam and its TCP implementation
//! - [`wire`]: Length-prefixed bincode framing and reply statuses
//! - [`config`]: TOML configuration
//! - [`protocol`]: Command parsing for the `kv` shell

pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod outcome;
pub mod protocol;
pub mod retry;
pub mod roster;
pub mod transport;
pub mod wire;

pub use client::{KvClient, KvClientBuilder};
pub use error::ClientError;
