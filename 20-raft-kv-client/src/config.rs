//! Client configuration loaded from TOML.
//!
//! ```toml
//! [[servers]]
//! host = "127.0.0.1"
//! port = 7001
//!
//! [transport]
//! connect_timeout_ms = 500
//! io_timeout_ms = 2000
//!
//! [retry]
//! initial_backoff_ms = 0
//! max_backoff_ms = 1000
//! max_attempts = 0
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::retry::RetryPolicy;
use crate::roster::Endpoint;
use crate::transport::TcpTransport;

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Cluster members in roster order.
    pub servers: Vec<ServerAddr>,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// One `host:port` entry of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl FromStr for ServerAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("invalid server '{s}', expected host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        ensure!(!host.is_empty(), "invalid server '{s}', host is empty");
        let port = port
            .parse()
            .with_context(|| format!("invalid port in server '{s}'"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Timeouts applied to every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: u64,
    /// Read and write timeout. 0 waits forever.
    pub io_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: TcpTransport::DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            io_timeout_ms: TcpTransport::DEFAULT_IO_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Pacing of the dispatch loop. The defaults retry immediately and forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 0 disables backoff.
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 0 means unbounded.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 1000,
            max_attempts: 0,
        }
    }
}

impl ClientConfig {
    /// Builds a configuration from explicit servers with default tuning.
    pub fn with_servers(servers: Vec<ServerAddr>) -> Self {
        Self {
            servers,
            transport: TransportConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Loads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses and validates configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let count = self.servers.len();
        ensure!(
            count >= 3 && count % 2 == 1,
            "the number of servers must be odd and at least 3, got {count}"
        );
        for server in &self.servers {
            ensure!(!server.host.is_empty(), "server host must not be empty");
            ensure!(server.port != 0, "server {server} has port 0");
        }
        ensure!(
            self.transport.connect_timeout_ms > 0,
            "transport.connect_timeout_ms must be positive"
        );
        ensure!(
            self.retry.max_backoff_ms >= self.retry.initial_backoff_ms,
            "retry.max_backoff_ms ({}) must be >= retry.initial_backoff_ms ({})",
            self.retry.max_backoff_ms,
            self.retry.initial_backoff_ms
        );
        Ok(())
    }

    /// Resolves every server, in order.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, ClientError> {
        self.servers
            .iter()
            .map(|server| Endpoint::resolve(&server.host, server.port))
            .collect()
    }

    pub fn tcp_transport(&self) -> TcpTransport {
        let io_timeout = match self.transport.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        TcpTransport::new(
            Duration::from_millis(self.transport.connect_timeout_ms),
            io_timeout,
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        );
        match self.retry.max_attempts {
            0 => policy,
            max => policy.with_max_attempts(max),
        }
    }
}
