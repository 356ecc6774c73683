//! SQL Server instance addressing.
//!
//! Accepts the forms operators type on the command line: `host`,
//! `host\INSTANCE`, `host,port`, `host:port` and `host\INSTANCE,port`.

use crate::{Result, error::InventoryError};
use serde::{Deserialize, Serialize};

/// Name SQL Server reports for the default (unnamed) instance.
pub const DEFAULT_INSTANCE_NAME: &str = "MSSQLSERVER";

/// Address of one target instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SqlInstance {
    host: String,
    instance: Option<String>,
    port: Option<u16>,
}

impl SqlInstance {
    /// Creates an address for the default instance on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            instance: None,
            port: None,
        }
    }

    /// Sets a named instance.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Sets an explicit TCP port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Parses an instance address.
    ///
    /// # Errors
    /// Returns `InvalidInstance` for an empty host, an empty instance name
    /// or a port that is not a non-zero `u16`.
    ///
    /// # Example
    /// ```rust
    /// use dbinventory_core::SqlInstance;
    ///
    /// let instance = SqlInstance::parse("sql01\\PROD,14330").unwrap();
    /// assert_eq!(instance.computer_name(), "sql01");
    /// assert_eq!(instance.instance_name(), "PROD");
    /// assert_eq!(instance.port(), Some(14330));
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || InventoryError::InvalidInstance {
            input: input.to_string(),
        };
        let trimmed = input.trim();

        let (address, port) = match trimmed.rsplit_once(',') {
            Some((address, port)) => (address, Some(port)),
            None => match trimmed.rsplit_once(':') {
                // host:port only when no named instance is present
                Some((address, port)) if !address.contains('\\') => (address, Some(port)),
                _ => (trimmed, None),
            },
        };

        let port = match port {
            Some(port) => match port.trim().parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid()),
                Ok(port) => Some(port),
            },
            None => None,
        };

        let (host, instance) = match address.split_once('\\') {
            Some((host, instance)) => {
                let instance = instance.trim();
                if instance.is_empty() {
                    return Err(invalid());
                }
                (host.trim(), Some(instance.to_string()))
            }
            None => (address.trim(), None),
        };

        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            instance,
            port,
        })
    }

    /// Host name or address
    pub fn computer_name(&self) -> &str {
        &self.host
    }

    /// Named instance, or `MSSQLSERVER` for the default instance
    pub fn instance_name(&self) -> &str {
        self.instance.as_deref().unwrap_or(DEFAULT_INSTANCE_NAME)
    }

    /// Named instance when one was given
    pub fn named_instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Explicit TCP port
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl std::fmt::Display for SqlInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(instance) = &self.instance {
            write!(f, "\\{}", instance)?;
        }
        if let Some(port) = self.port {
            write!(f, ",{}", port)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SqlInstance {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_instance() {
        let instance = SqlInstance::parse("sql01").unwrap();
        assert_eq!(instance.computer_name(), "sql01");
        assert_eq!(instance.instance_name(), DEFAULT_INSTANCE_NAME);
        assert_eq!(instance.named_instance(), None);
        assert_eq!(instance.port(), None);
        assert_eq!(instance.to_string(), "sql01");
    }

    #[test]
    fn test_parse_named_instance_with_port() {
        let instance = SqlInstance::parse("sql01\\PROD,14330").unwrap();
        assert_eq!(instance.instance_name(), "PROD");
        assert_eq!(instance.port(), Some(14330));
        assert_eq!(instance.to_string(), "sql01\\PROD,14330");
    }

    #[test]
    fn test_parse_colon_port() {
        let instance = SqlInstance::parse("10.0.0.5:1444").unwrap();
        assert_eq!(instance.computer_name(), "10.0.0.5");
        assert_eq!(instance.port(), Some(1444));
        assert_eq!(instance.to_string(), "10.0.0.5,1444");
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        for input in ["", "   ", "\\PROD", "sql01\\", "sql01,0", "sql01,abc", "sql01:70000"] {
            assert!(
                matches!(
                    SqlInstance::parse(input),
                    Err(InventoryError::InvalidInstance { .. })
                ),
                "expected rejection for '{}'",
                input
            );
        }
    }

    #[test]
    fn test_builder_matches_parse() {
        let built = SqlInstance::new("sql02").with_instance("DEV").with_port(1500);
        assert_eq!(built, "sql02\\DEV,1500".parse().unwrap());
    }
}
