//! The fixed list of servers a client talks to.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::ClientError;

/// A server endpoint, resolved once when the client is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    label: String,
    addr: SocketAddr,
}

impl Endpoint {
    /// Resolves `host:port`, keeping the first address the resolver returns.
    pub fn resolve(host: &str, port: u16) -> Result<Self, ClientError> {
        let resolve_error = |source| ClientError::Resolve {
            host: host.to_string(),
            port,
            source,
        };
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(resolve_error)?
            .next()
            .ok_or_else(|| {
                resolve_error(io::Error::new(
                    io::ErrorKind::NotFound,
                    "resolver returned no addresses",
                ))
            })?;
        Ok(Self {
            label: format!("{host}:{port}"),
            addr,
        })
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            label: addr.to_string(),
            addr,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The name the endpoint was configured with, used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Ordered server endpoints with an odd count of at least three.
#[derive(Debug, Clone)]
pub struct ServerRoster {
    endpoints: Vec<Endpoint>,
}

impl ServerRoster {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ClientError> {
        let len = endpoints.len();
        if len < 3 || len % 2 == 0 {
            return Err(ClientError::InvalidRoster { len });
        }
        Ok(Self { endpoints })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The endpoint at `index`, wrapping around the roster.
    pub fn get(&self, index: usize) -> &Endpoint {
        &self.endpoints[index % self.endpoints.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }
}
