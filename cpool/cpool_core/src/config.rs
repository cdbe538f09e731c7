//! Pool and connection configuration.
//!
//! Both structs deserialize from partial documents: every missing field falls
//! back to its default, so an empty `[pool]` table is a valid configuration.

use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of resources created up front; fixed for the pool's lifetime
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Default deadline for `acquire`, in milliseconds (`None` waits forever)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,

    /// Default deadline for a draining `shutdown`, in milliseconds
    /// (`None` waits forever)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
}

fn default_capacity() -> usize {
    10
}

/// Whole milliseconds in `timeout`, rounded up and saturating at `u64::MAX`.
fn millis_ceil(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            acquire_timeout_ms: None,
            drain_timeout_ms: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given capacity and no deadlines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set the default acquire deadline, rounded up to whole milliseconds.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(millis_ceil(timeout));
        self
    }

    /// Set the default drain deadline, rounded up to whole milliseconds.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = Some(millis_ceil(timeout));
        self
    }

    /// The default acquire deadline, if any.
    pub fn acquire_deadline(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// The default drain deadline, if any.
    pub fn drain_deadline(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration before any resource is created.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters a factory uses to open a database connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Server host name
    #[serde(default = "default_host")]
    pub host: String,

    /// User to authenticate as
    #[serde(default = "default_user")]
    pub user: String,

    /// Password for `user`
    #[serde(default)]
    pub password: String,

    /// Database selected after connecting
    #[serde(default = "default_database")]
    pub database: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Unix socket path, used instead of TCP when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,

    /// Client flags passed through to the driver
    #[serde(default)]
    pub flags: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "test".to_string()
}

fn default_port() -> u16 {
    3306
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            port: default_port(),
            socket: None,
            flags: 0,
        }
    }
}

impl ConnectionParams {
    /// A `user@host:port/database` description, never including the password.
    pub fn endpoint(&self) -> String {
        match &self.socket {
            Some(socket) => format!("{}@{}/{}", self.user, socket, self.database),
            None => format!(
                "{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("flags", &self.flags)
            .finish()
    }
}
