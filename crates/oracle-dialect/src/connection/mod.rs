//! Connection management: configuration, connect-time error
//! classification, and bb8 pooling.

mod driver;
mod lock;

pub use driver::{Driver, DriverError, ExecuteOptions, RawResult, Row};
pub use lock::{ConnectionLock, ResourceLock};

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DialectError, Result};

const DEFAULT_PORT: u16 = 1521;

/// Connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Service name or SID.
    pub database: String,
    pub username: String,
    pub password: String,
    /// Upper bound on the connect attempt; unbounded when absent.
    #[serde(default)]
    pub connect_timeout: Option<Duration>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionConfig {
    /// EZConnect-style `host[:port]/database`, with the port elided when it
    /// is the default.
    pub fn connect_string(&self) -> String {
        if self.port == DEFAULT_PORT {
            format!("{}/{}", self.host, self.database)
        } else {
            format!("{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

/// True for driver codes that mean the socket died under us; such
/// connections are marked broken so the pool evicts instead of reusing
/// them.
pub fn is_socket_reset(code: Option<&str>) -> bool {
    matches!(code, Some("ESOCKET" | "ECONNRESET"))
}

/// Map a connect-time driver error onto the connection error family.
///
/// `ESOCKET` is a catch-all on the driver side, so the message is sniffed
/// for the underlying syscall failure.
fn classify_connect_error(err: DriverError) -> DialectError {
    match err.code.as_deref() {
        Some("ESOCKET") => {
            let msg = &err.message;
            if msg.contains("connect EHOSTUNREACH")
                || msg.contains("connect ENETUNREACH")
                || msg.contains("connect EADDRNOTAVAIL")
            {
                DialectError::HostNotReachable(err.message)
            } else if msg.contains("getaddrinfo ENOTFOUND") {
                DialectError::HostNotFound(err.message)
            } else if msg.contains("connect ECONNREFUSED") {
                DialectError::ConnectionRefused(err.message)
            } else {
                DialectError::Connection(err.message)
            }
        }
        Some("ELOGIN" | "ER_ACCESS_DENIED_ERROR") => DialectError::AccessDenied(err.message),
        Some("EINVAL") => DialectError::InvalidConnection(err.message),
        _ => DialectError::Connection(err.message),
    }
}

/// Opens, validates and closes driver connections. Doubles as the bb8
/// pool manager.
#[derive(Debug)]
pub struct ConnectionManager<D> {
    config: ConnectionConfig,
    _driver: PhantomData<fn() -> D>,
}

impl<D: Driver> ConnectionManager<D> {
    pub fn new(config: ConnectionConfig) -> Self {
        ConnectionManager {
            config,
            _driver: PhantomData,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a connection, bounded by the configured timeout.
    pub async fn connect(&self) -> Result<D> {
        let connect_string = self.config.connect_string();
        let attempt = D::connect(&self.config, &connect_string);
        let connection = match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| DialectError::ConnectTimeout(limit))?,
            None => attempt.await,
        }
        .map_err(classify_connect_error)?;
        debug!(id = connection.id(), "connection acquired");
        Ok(connection)
    }

    /// Close a connection; closing an already-closed handle is a no-op.
    pub async fn disconnect(&self, lock: &ResourceLock<D>) -> Result<()> {
        let mut guard = lock.lock().await;
        let Some(connection) = guard.connection() else {
            return Ok(());
        };
        if connection.is_closed() {
            return Ok(());
        }
        connection
            .close()
            .await
            .map_err(|e| DialectError::Connection(e.message))?;
        debug!("connection closed");
        Ok(())
    }

    /// A connection is usable iff the handle exists and is still logged in.
    pub async fn validate(&self, lock: &ResourceLock<D>) -> bool {
        let mut guard = lock.lock().await;
        match guard.connection() {
            Some(connection) => !connection.is_closed() && connection.is_logged_in(),
            None => false,
        }
    }
}

#[async_trait]
impl<D: Driver> bb8::ManageConnection for ConnectionManager<D> {
    type Connection = ResourceLock<D>;
    type Error = DialectError;

    async fn connect(&self) -> Result<Self::Connection> {
        let connection = ConnectionManager::connect(self).await?;
        Ok(ResourceLock::new(connection))
    }

    async fn is_valid(&self, lock: &mut Self::Connection) -> Result<()> {
        if self.validate(lock).await {
            Ok(())
        } else {
            Err(DialectError::Connection(
                "connection failed validation".to_string(),
            ))
        }
    }

    fn has_broken(&self, lock: &mut Self::Connection) -> bool {
        lock.is_broken()
    }
}
