//! Instance connection configuration.
//!
//! Transport-level settings shared by every instance in a batch. The
//! instance address itself lives in [`crate::SqlInstance`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default SQL Server TCP port.
pub const DEFAULT_PORT: u16 = 1433;

/// Configuration for instance connections.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
///
/// # Example
/// ```rust
/// use dbinventory_core::adapters::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new()
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_trust_server_certificate(true);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port used when the instance address does not carry one
    pub default_port: u16,
    /// TCP connect + login timeout
    pub connect_timeout: Duration,
    /// Timeout for each catalog query
    pub query_timeout: Duration,
    /// Request TLS for the session
    pub encrypt: bool,
    /// Accept self-signed server certificates
    pub trust_server_certificate: bool,
    /// Application name reported to the server
    pub application_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(15),
            query_timeout: Duration::from_secs(60),
            encrypt: true,
            trust_server_certificate: false,
            application_name: "dbinventory".to_string(),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig(port {}, connect {:?}, query {:?}, encrypt {})",
            self.default_port, self.connect_timeout, self.query_timeout, self.encrypt
        )
    }
}

impl ConnectionConfig {
    /// Creates a new connection config with safe defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.default_port == 0 {
            return Err(crate::error::InventoryError::configuration(
                "port must be greater than 0",
            ));
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(crate::error::InventoryError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.as_secs() == 0 {
            return Err(crate::error::InventoryError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.application_name.trim().is_empty() {
            return Err(crate::error::InventoryError::configuration(
                "application_name cannot be empty",
            ));
        }

        Ok(())
    }

    /// Builder method to set the default port.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to accept self-signed certificates.
    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Builder method to toggle TLS.
    pub fn with_encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }
}
