//! The public client facade.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::envelope::{ClientId, EnvelopeBuilder, IdSource, RandomIds};
use crate::error::ClientError;
use crate::retry::{CancelToken, RetryPolicy};
use crate::roster::{Endpoint, ServerRoster};
use crate::transport::{TcpTransport, Transport};

/// A client of the replicated key-value store.
///
/// Every call blocks the calling thread until the cluster gives a terminal
/// answer. The client is `Send + Sync`; threads sharing one instance share its
/// leader hint and client id, and each call still gets its own serial.
///
/// ```no_run
/// use raft_kv_client::client::KvClient;
/// use raft_kv_client::config::ClientConfig;
/// use std::path::Path;
///
/// let config = ClientConfig::from_file(Path::new("config/client.toml"))?;
/// let client = KvClient::connect(&config)?;
/// client.put("greeting", "hello")?;
/// client.append("greeting", ", world")?;
/// assert_eq!(client.get("greeting")?.as_deref(), Some("hello, world"));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct KvClient {
    envelopes: EnvelopeBuilder,
    dispatcher: Dispatcher,
}

impl KvClient {
    /// Client over `endpoints` with default identifiers and retry policy.
    pub fn new(
        endpoints: Vec<Endpoint>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        Self::builder(endpoints).transport(transport).build()
    }

    pub fn builder(endpoints: Vec<Endpoint>) -> KvClientBuilder {
        KvClientBuilder::new(endpoints)
    }

    /// Resolves the configured servers and talks to them over TCP.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoints = config.endpoints().context("failed to resolve servers")?;
        let client = Self::builder(endpoints)
            .transport(Arc::new(config.tcp_transport()))
            .retry_policy(config.retry_policy())
            .build()?;
        Ok(client)
    }

    pub fn client_id(&self) -> ClientId {
        self.envelopes.client_id()
    }

    /// Roster index of the server the next request will be sent to first.
    pub fn leader_hint(&self) -> usize {
        self.dispatcher.leader_hint()
    }

    pub fn roster(&self) -> &ServerRoster {
        self.dispatcher.roster()
    }

    /// Reads `key`. `Ok(None)` means the key does not exist.
    pub fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        let envelope = self.envelopes.get(key);
        self.dispatcher.dispatch(&envelope)
    }

    /// Replaces the value of `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let envelope = self.envelopes.put(key, value);
        self.dispatcher.dispatch(&envelope).map(|_| ())
    }

    /// Appends `value` to `key`, creating it if absent.
    pub fn append(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let envelope = self.envelopes.append(key, value);
        self.dispatcher.dispatch(&envelope).map(|_| ())
    }
}

impl fmt::Debug for KvClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvClient")
            .field("client_id", &self.client_id())
            .field("leader_hint", &self.leader_hint())
            .field("servers", &self.roster().len())
            .finish()
    }
}

/// Assembles a [`KvClient`] from its collaborators.
pub struct KvClientBuilder {
    endpoints: Vec<Endpoint>,
    transport: Option<Arc<dyn Transport>>,
    ids: Option<Arc<dyn IdSource>>,
    policy: RetryPolicy,
    cancel: CancelToken,
}

impl KvClientBuilder {
    fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            transport: None,
            ids: None,
            policy: RetryPolicy::default(),
            cancel: CancelToken::never(),
        }
    }

    /// Defaults to [`TcpTransport::default`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`RandomIds`].
    pub fn id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lets the owner of the matching `Canceller` stop calls that are still retrying.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validates the roster and builds the client. No network traffic happens here.
    pub fn build(self) -> Result<KvClient, ClientError> {
        let roster = ServerRoster::new(self.endpoints)?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TcpTransport::default()));
        let ids = self.ids.unwrap_or_else(|| Arc::new(RandomIds));
        let envelopes = EnvelopeBuilder::new(ids);

        info!(
            client = %envelopes.client_id(),
            servers = roster.len(),
            "kv client ready"
        );

        Ok(KvClient {
            envelopes,
            dispatcher: Dispatcher::new(roster, transport, self.policy, self.cancel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::envelope::{RequestEnvelope, SequentialIds};
    use crate::transport::TransportError;
    use crate::wire::Reply;

    /// Counts attempts and answers every one with the same reply.
    struct FixedTransport {
        reply: Reply,
        attempts: AtomicUsize,
        last: Mutex<Option<RequestEnvelope>>,
    }

    impl FixedTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                attempts: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    impl Transport for FixedTransport {
        fn attempt(
            &self,
            _endpoint: &Endpoint,
            envelope: &RequestEnvelope,
        ) -> Result<Reply, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(envelope.clone());
            Ok(self.reply.clone())
        }
    }

    fn endpoints(n: u16) -> Vec<Endpoint> {
        (0..n)
            .map(|i| Endpoint::from_addr(SocketAddr::from(([127, 0, 0, 1], 7001 + i))))
            .collect()
    }

    #[test]
    fn test_invalid_roster_fails_before_any_attempt() {
        for n in [1, 2, 4] {
            let transport = FixedTransport::new(Reply::ok(""));
            let err = KvClient::new(endpoints(n), transport.clone()).expect_err("invalid roster");
            assert!(matches!(err, ClientError::InvalidRoster { .. }));
            assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn test_injected_ids_tag_requests() {
        let transport = FixedTransport::new(Reply::ok("v"));
        let ids = Arc::new(SequentialIds::new(9));
        let client = KvClient::builder(endpoints(3))
            .transport(transport.clone())
            .id_source(ids.clone())
            .build()
            .expect("client");

        assert_eq!(client.client_id(), ids.client_id());
        assert_eq!(client.get("k").expect("get"), Some("v".to_string()));
        let sent = transport.last.lock().unwrap().clone().expect("one attempt");
        assert_eq!(sent.client_id(), client.client_id());
        assert_eq!(sent.key(), "k");
    }

    #[test]
    fn test_writes_discard_reply_value() {
        let transport = FixedTransport::new(Reply::ok("ignored"));
        let client = KvClient::new(endpoints(3), transport.clone()).expect("client");
        client.put("k", "v").expect("put");
        client.append("k", "w").expect("append");
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_client_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KvClient>();
    }
}
