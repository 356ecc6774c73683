//! SQL Server adapter built on tiberius.
//!
//! # Security
//! - Catalog reads only (`sys.databases`, `sys.master_files`, `msdb.dbo.backupset`)
//! - Credentials are consumed during login and never logged
//! - Driver messages are sanitized before they are wrapped into errors

mod connection;
mod enumeration;
mod history;
mod row;

pub use connection::SqlServerConnector;

use crate::SqlInstance;
use crate::adapters::{
    BackupHistoryProvider, BackupHistoryQuery, DatabaseEnumerator, ServerHandle,
};
use crate::models::{BackupHistoryRecord, DatabaseRecord};
use crate::Result;
use async_trait::async_trait;
use chrono::FixedOffset;
use std::time::Duration;
use tiberius::Client;
use tokio::net::TcpStream;
use tokio_util::compat::Compat;

pub(crate) type SqlClient = Client<Compat<TcpStream>>;

/// An authenticated session against one instance.
pub struct SqlServerSession {
    client: SqlClient,
    instance: SqlInstance,
    query_timeout: Duration,
    version: Option<String>,
    /// Offset of the server's local clock, which msdb timestamps use
    utc_offset: FixedOffset,
}

impl SqlServerSession {
    /// Display identity of the connected instance
    pub fn instance(&self) -> &SqlInstance {
        &self.instance
    }
}

#[async_trait]
impl DatabaseEnumerator for SqlServerSession {
    async fn enumerate_databases(
        &mut self,
        include_backup_sets: bool,
    ) -> Result<Vec<DatabaseRecord>> {
        let identity = self.instance.to_string();
        enumeration::list_databases(
            &mut self.client,
            self.query_timeout,
            self.utc_offset,
            include_backup_sets,
        )
        .await
            .map_err(|e| crate::error::InventoryError::enumeration_failed(identity, e))
    }
}

#[async_trait]
impl BackupHistoryProvider for SqlServerSession {
    async fn backup_history(
        &mut self,
        query: &BackupHistoryQuery,
    ) -> Result<Vec<BackupHistoryRecord>> {
        let identity = self.instance.to_string();
        history::last_backups(&mut self.client, query, self.query_timeout, self.utc_offset)
            .await
            .map_err(|e| crate::error::InventoryError::history_lookup_failed(identity, e))
    }
}

impl ServerHandle for SqlServerSession {
    fn server_version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}
