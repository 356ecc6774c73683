//! Collaborator traits and the adapter factory.
//!
//! The inventory pipeline never talks to a driver directly. It asks a
//! [`ConnectionProvider`] for a [`ServerHandle`], enumerates databases
//! through it, and hands the same handle to the staleness evaluator as a
//! backup history source. Tests substitute in-memory implementations.

use crate::models::{BackupHistoryRecord, BackupKind, DatabaseRecord};
use crate::security::Credentials;
use crate::{Result, SqlInstance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod config;

#[cfg(feature = "mssql")]
pub mod sqlserver;

pub use config::{ConnectionConfig, DEFAULT_PORT};

/// Parameters of one backup history lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHistoryQuery {
    /// Backup type to look up
    pub kind: BackupKind,
    /// Skip copy-only backups
    pub ignore_copy_only: bool,
    /// Only consider backups finished at or after this instant
    pub since: Option<DateTime<Utc>>,
}

/// Opens sessions against target instances.
///
/// # Security
/// Implementations must never log or embed credentials in errors.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connects and authenticates.
    ///
    /// # Errors
    /// Returns `ConnectionFailed` tagged with the instance identity.
    async fn connect(
        &self,
        instance: &SqlInstance,
        credentials: &Credentials,
    ) -> Result<Box<dyn ServerHandle>>;
}

/// Lists the databases of a connected instance.
#[async_trait]
pub trait DatabaseEnumerator: Send {
    /// Returns one snapshot record per database, ordered by name.
    ///
    /// Backup-set descriptors are only loaded when `include_backup_sets`
    /// is true; otherwise `backup_sets` is left empty.
    async fn enumerate_databases(
        &mut self,
        include_backup_sets: bool,
    ) -> Result<Vec<DatabaseRecord>>;
}

/// Reads recorded backup history from a connected instance.
#[async_trait]
pub trait BackupHistoryProvider: Send {
    /// Last qualifying backup per database for the query.
    async fn backup_history(
        &mut self,
        query: &BackupHistoryQuery,
    ) -> Result<Vec<BackupHistoryRecord>>;
}

/// A live session: enumerator and history source in one.
pub trait ServerHandle: DatabaseEnumerator + BackupHistoryProvider {
    /// Server version string, when the session reported one
    fn server_version(&self) -> Option<&str> {
        None
    }
}

/// Creates the connection provider compiled into this build.
///
/// # Errors
/// Returns a configuration error if the config is invalid or no driver
/// feature is enabled.
///
/// # Example
/// ```rust,no_run
/// use dbinventory_core::adapters::{ConnectionConfig, create_provider};
///
/// let provider = create_provider(ConnectionConfig::default())?;
/// # Ok::<(), dbinventory_core::InventoryError>(())
/// ```
pub fn create_provider(config: ConnectionConfig) -> Result<Box<dyn ConnectionProvider>> {
    config.validate()?;

    #[cfg(feature = "mssql")]
    {
        Ok(Box::new(sqlserver::SqlServerConnector::new(config)))
    }

    #[cfg(not(feature = "mssql"))]
    {
        let _ = config;
        Err(crate::error::InventoryError::configuration(
            "SQL Server support not available. Compile with --features mssql",
        ))
    }
}
