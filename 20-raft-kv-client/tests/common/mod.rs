//! Test harness: real TCP servers on localhost with scripted behaviour.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use raft_kv_client::envelope::{ClientId, OpKind, RequestEnvelope, Serial};
use raft_kv_client::roster::Endpoint;
use raft_kv_client::wire::{self, Reply};

/// How a test server answers.
#[derive(Clone)]
pub enum Behavior {
    /// Always reply `ErrWrongLeader`.
    Follower,
    /// Accept the connection, read the request and hang up without replying.
    Hangup,
    /// Read the request and hold the connection open for this long without replying.
    Silent(Duration),
    /// Always send this exact reply.
    Fixed(Reply),
    /// Act as leader over the shared store.
    Leader(Arc<DedupStore>),
    /// Apply writes to the shared store, but drop the reply for the first `n` requests.
    LossyLeader(Arc<DedupStore>, usize),
}

/// In-memory key-value state that applies each `(client, serial)` write once.
#[derive(Default)]
pub struct DedupStore {
    data: Mutex<BTreeMap<String, String>>,
    applied: Mutex<HashSet<(ClientId, Serial)>>,
    applications: AtomicUsize,
}

impl DedupStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(entries: &[(&str, &str)]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut data = store.data.lock().unwrap();
            for (key, value) in entries {
                data.insert(key.to_string(), value.to_string());
            }
        }
        Arc::new(store)
    }

    /// Number of writes actually applied, duplicates excluded.
    pub fn applications(&self) -> usize {
        self.applications.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    fn execute(&self, envelope: &RequestEnvelope) -> Reply {
        if envelope.kind() == OpKind::Get {
            return match self.value(envelope.key()) {
                Some(value) => Reply::ok(value),
                None => Reply::no_key(),
            };
        }

        let first_time = self
            .applied
            .lock()
            .unwrap()
            .insert((envelope.client_id(), envelope.serial()));
        if first_time {
            let mut data = self.data.lock().unwrap();
            let value = envelope.value().unwrap_or_default();
            match envelope.kind() {
                OpKind::Put => {
                    data.insert(envelope.key().to_string(), value.to_string());
                }
                OpKind::Append => data.entry(envelope.key().to_string()).or_default().push_str(value),
                OpKind::Get => unreachable!(),
            }
            self.applications.fetch_add(1, Ordering::SeqCst);
        }
        Reply::ok("")
    }
}

/// A server thread answering on an ephemeral localhost port.
pub struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<RequestEnvelope>>>,
    stop: Arc<AtomicBool>,
}

impl TestServer {
    pub fn spawn(behavior: Behavior) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_received = Arc::clone(&received);
        let thread_stop = Arc::clone(&stop);
        thread::spawn(move || {
            let dropped = AtomicUsize::new(0);
            for stream in listener.incoming() {
                if thread_stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let _ = serve(stream, &behavior, &thread_received, &dropped);
            }
        });

        Ok(Self {
            addr,
            received,
            stop,
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from_addr(self.addr)
    }

    /// Every envelope this server has read, in arrival order.
    pub fn received(&self) -> Vec<RequestEnvelope> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so it observes the flag.
        let _ = TcpStream::connect_timeout(&self.addr, Duration::from_millis(100));
    }
}

fn serve(
    mut stream: TcpStream,
    behavior: &Behavior,
    received: &Mutex<Vec<RequestEnvelope>>,
    dropped: &AtomicUsize,
) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let envelope: RequestEnvelope = wire::recv(&mut stream)?;
    received.lock().unwrap().push(envelope.clone());

    let reply = match behavior {
        Behavior::Follower => Reply::wrong_leader(),
        Behavior::Hangup => return Ok(()),
        Behavior::Silent(delay) => {
            thread::sleep(*delay);
            return Ok(());
        }
        Behavior::Fixed(reply) => reply.clone(),
        Behavior::Leader(store) => store.execute(&envelope),
        Behavior::LossyLeader(store, drop_first) => {
            let reply = store.execute(&envelope);
            if dropped.fetch_add(1, Ordering::SeqCst) < *drop_first {
                return Ok(());
            }
            reply
        }
    };
    wire::send(&mut stream, &reply)?;
    Ok(())
}

/// An endpoint with nothing listening on it.
pub fn dead_endpoint() -> Result<Endpoint> {
    let addr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    Ok(Endpoint::from_addr(addr))
}
