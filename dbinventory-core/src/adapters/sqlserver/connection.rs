//! TCP connection and login for SQL Server instances.

use super::row::{RowExt, fetch_rows};
use super::{SqlClient, SqlServerSession};
use crate::adapters::{ConnectionConfig, ConnectionProvider, ServerHandle};
use crate::error::{InventoryError, SanitizedError};
use crate::security::Credentials;
use crate::{Result, SqlInstance};
use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

/// Connection provider for SQL Server using SQL authentication.
///
/// # Example
/// ```rust,no_run
/// use dbinventory_core::adapters::{ConnectionConfig, ConnectionProvider, DatabaseEnumerator};
/// use dbinventory_core::adapters::sqlserver::SqlServerConnector;
/// use dbinventory_core::{SqlInstance, security::Credentials};
///
/// # async fn example() -> dbinventory_core::Result<()> {
/// let connector = SqlServerConnector::new(ConnectionConfig::default());
/// let credentials = Credentials::new("inventory".to_string(), Some("secret".to_string()));
/// let mut handle = connector.connect(&SqlInstance::parse("sql01")?, &credentials).await?;
/// let databases = handle.enumerate_databases(false).await?;
/// println!("{} databases", databases.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqlServerConnector {
    config: ConnectionConfig,
}

impl SqlServerConnector {
    /// Creates a connector with the given transport settings.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Builds the tiberius configuration for one instance.
    fn tiberius_config(&self, instance: &SqlInstance, credentials: &Credentials) -> Config {
        let mut config = Config::new();
        config.host(instance.computer_name());
        config.port(instance.port().unwrap_or(self.config.default_port));
        if let Some(name) = instance.named_instance() {
            config.instance_name(name);
        }
        config.authentication(AuthMethod::sql_server(
            credentials.username(),
            credentials.password(),
        ));
        config.application_name(&self.config.application_name);
        config.encryption(if self.config.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if self.config.trust_server_certificate {
            config.trust_cert();
        }
        config
    }

    /// Opens the TCP stream, resolving named instances through SQL Browser
    /// unless an explicit port was given.
    async fn open_stream(&self, instance: &SqlInstance, config: &Config) -> Result<TcpStream> {
        let identity = instance.to_string();
        let failed = |e: std::io::Error| {
            InventoryError::connection_failed(&identity, SanitizedError::from_error(e))
        };

        let tcp = if instance.named_instance().is_some() && instance.port().is_none() {
            TcpStream::connect_named(config).await.map_err(|e| {
                InventoryError::connection_failed(&identity, SanitizedError::from_error(e))
            })?
        } else {
            TcpStream::connect(config.get_addr()).await.map_err(failed)?
        };

        tcp.set_nodelay(true).map_err(failed)?;

        Ok(tcp)
    }

    async fn login(
        &self,
        instance: &SqlInstance,
        credentials: &Credentials,
    ) -> Result<SqlServerSession> {
        let identity = instance.to_string();
        let config = self.tiberius_config(instance, credentials);
        let tcp = self.open_stream(instance, &config).await?;

        let mut client: SqlClient = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| {
                InventoryError::connection_failed(&identity, SanitizedError::from_error(e))
            })?;

        let version = server_version(&mut client, &self.config).await;
        let utc_offset = server_utc_offset(&mut client, &self.config).await;

        Ok(SqlServerSession {
            client,
            instance: instance.clone(),
            query_timeout: self.config.query_timeout,
            version,
            utc_offset,
        })
    }
}

/// Reads `SERVERPROPERTY('ProductVersion')`; a failure here only costs the
/// version column, so it is logged and swallowed.
async fn server_version(client: &mut SqlClient, config: &ConnectionConfig) -> Option<String> {
    let query = Query::new(
        "SELECT CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128)) AS version",
    );
    let rows = match fetch_rows(client, query, config.query_timeout, "SERVERPROPERTY").await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!("Could not read server version: {}", e);
            return None;
        }
    };

    rows.first()
        .and_then(|row| row.get_field::<&str>("version", "SERVERPROPERTY").ok().flatten())
        .map(str::to_string)
}

/// Reads the server clock's UTC offset.
///
/// msdb timestamps are server-local; when the offset cannot be read they
/// are treated as UTC and a warning is logged.
async fn server_utc_offset(client: &mut SqlClient, config: &ConnectionConfig) -> FixedOffset {
    let query = Query::new("SELECT DATEPART(TZOFFSET, SYSDATETIMEOFFSET()) AS offset_minutes");
    let minutes = match fetch_rows(client, query, config.query_timeout, "SYSDATETIMEOFFSET").await {
        Ok(rows) => rows.first().and_then(|row| {
            row.get_field::<i32>("offset_minutes", "SYSDATETIMEOFFSET")
                .ok()
                .flatten()
        }),
        Err(e) => {
            tracing::debug!("Could not read server clock offset: {}", e);
            None
        }
    };

    minutes.and_then(offset_from_minutes).unwrap_or_else(|| {
        tracing::warn!("Server clock offset unknown; backup timestamps are read as UTC");
        Utc.fix()
    })
}

/// Offset for a `TZOFFSET` value, rejecting anything outside +/-14h.
fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    if minutes.abs() > 14 * 60 {
        return None;
    }
    FixedOffset::east_opt(minutes * 60)
}

#[async_trait]
impl ConnectionProvider for SqlServerConnector {
    async fn connect(
        &self,
        instance: &SqlInstance,
        credentials: &Credentials,
    ) -> Result<Box<dyn ServerHandle>> {
        tracing::debug!("Connecting to {} ({})", instance, self.config);

        let login = self.login(instance, credentials);
        let session = tokio::time::timeout(self.config.connect_timeout, login)
            .await
            .map_err(|_| {
                InventoryError::connection_failed(
                    instance.to_string(),
                    SanitizedError(format!(
                        "timed out after {:?}",
                        self.config.connect_timeout
                    )),
                )
            })??;

        tracing::debug!(
            "Connected to {} (version {})",
            session.instance(),
            session.version.as_deref().unwrap_or("unknown")
        );

        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials::new("inventory".to_string(), Some("super_secret_password_123".to_string()))
    }

    #[test]
    fn test_tiberius_config_uses_instance_port() {
        let connector = SqlServerConnector::new(ConnectionConfig::default());
        let instance = SqlInstance::parse("sql01,14330").unwrap();
        let config = connector.tiberius_config(&instance, &credentials());
        assert_eq!(config.get_addr(), "sql01:14330");
    }

    #[test]
    fn test_tiberius_config_falls_back_to_default_port() {
        let connector =
            SqlServerConnector::new(ConnectionConfig::default().with_default_port(1500));
        let instance = SqlInstance::parse("sql01").unwrap();
        let config = connector.tiberius_config(&instance, &credentials());
        assert_eq!(config.get_addr(), "sql01:1500");
    }

    #[test]
    fn test_offset_from_minutes() {
        assert_eq!(offset_from_minutes(60), FixedOffset::east_opt(3600));
        assert_eq!(offset_from_minutes(-300), FixedOffset::west_opt(5 * 3600));
        assert_eq!(offset_from_minutes(0), FixedOffset::east_opt(0));
        assert_eq!(offset_from_minutes(15 * 60), None);
    }

    #[tokio::test]
    async fn test_connection_failure_is_sanitized_and_tagged() {
        // Port 9 on localhost is expected to refuse or time out quickly.
        let connector = SqlServerConnector::new(
            ConnectionConfig::default().with_connect_timeout(Duration::from_secs(2)),
        );
        let instance = SqlInstance::parse("127.0.0.1,9").unwrap();

        let result = connector.connect(&instance, &credentials()).await;
        let Err(error) = result else {
            panic!("connection to a closed port unexpectedly succeeded");
        };

        assert!(matches!(error, InventoryError::ConnectionFailed { .. }));
        assert_eq!(error.instance(), Some("127.0.0.1,9"));
        let message = format!("{:?} {}", error, error);
        assert!(!message.contains("super_secret_password_123"));
    }
}
