//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dbinventory_core::adapters::{
    BackupHistoryProvider, BackupHistoryQuery, ConnectionProvider, DatabaseEnumerator,
    ServerHandle,
};
use dbinventory_core::error::SanitizedError;
use dbinventory_core::models::{BackupHistoryRecord, BackupKind, DatabaseRecord};
use dbinventory_core::security::Credentials;
use dbinventory_core::{InventoryError, Result, SqlInstance};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const TEST_PASSWORD: &str = "super_secret_password_123";

pub fn credentials() -> Credentials {
    Credentials::new("inventory".to_string(), Some(TEST_PASSWORD.to_string()))
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn full_backup(name: &str, finished_at: DateTime<Utc>) -> BackupHistoryRecord {
    BackupHistoryRecord {
        database_name: name.to_string(),
        kind: BackupKind::Full,
        finished_at,
        is_copy_only: false,
    }
}

pub fn names(records: &[DatabaseRecord]) -> Vec<&str> {
    records.iter().map(|r| r.name.as_str()).collect()
}

/// Canned contents of one fake server.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub version: Option<String>,
    pub databases: Vec<DatabaseRecord>,
    pub history: Vec<BackupHistoryRecord>,
    pub fail_history: bool,
    pub fail_enumeration: bool,
}

impl FakeServer {
    pub fn with_databases(databases: Vec<DatabaseRecord>) -> Self {
        Self {
            version: Some("16.0.1000.6".to_string()),
            databases,
            ..Self::default()
        }
    }
}

/// Calls observed by the fake provider.
#[derive(Debug, Default)]
pub struct CallLog {
    pub connects: Vec<String>,
    pub enumerations: Vec<(String, bool)>,
    pub history_queries: Vec<(String, BackupHistoryQuery)>,
}

/// Connection provider backed by a map of instance identity to server.
/// Instances missing from the map refuse connections.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    servers: HashMap<String, FakeServer>,
    pub calls: Arc<Mutex<CallLog>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, instance: &str, server: FakeServer) -> Self {
        self.servers.insert(instance.to_string(), server);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.calls.lock().unwrap().connects.len()
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    async fn connect(
        &self,
        instance: &SqlInstance,
        credentials: &Credentials,
    ) -> Result<Box<dyn ServerHandle>> {
        let identity = instance.to_string();
        self.calls.lock().unwrap().connects.push(identity.clone());

        let Some(server) = self.servers.get(&identity) else {
            return Err(InventoryError::connection_failed(
                identity,
                SanitizedError(format!(
                    "Login failed for user '{}': server unreachable",
                    credentials.username()
                )),
            ));
        };

        Ok(Box::new(FakeSession {
            identity,
            server: server.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct FakeSession {
    identity: String,
    server: FakeServer,
    calls: Arc<Mutex<CallLog>>,
}

#[async_trait]
impl DatabaseEnumerator for FakeSession {
    async fn enumerate_databases(
        &mut self,
        include_backup_sets: bool,
    ) -> Result<Vec<DatabaseRecord>> {
        self.calls
            .lock()
            .unwrap()
            .enumerations
            .push((self.identity.clone(), include_backup_sets));

        if self.server.fail_enumeration {
            return Err(InventoryError::query_failed("sys.databases"));
        }

        let mut databases = self.server.databases.clone();
        if !include_backup_sets {
            for db in &mut databases {
                db.backup_sets.clear();
            }
        }
        Ok(databases)
    }
}

#[async_trait]
impl BackupHistoryProvider for FakeSession {
    async fn backup_history(
        &mut self,
        query: &BackupHistoryQuery,
    ) -> Result<Vec<BackupHistoryRecord>> {
        self.calls
            .lock()
            .unwrap()
            .history_queries
            .push((self.identity.clone(), query.clone()));

        if self.server.fail_history {
            return Err(InventoryError::query_failed("msdb.dbo.backupset timed out"));
        }

        Ok(self
            .server
            .history
            .iter()
            .filter(|row| row.kind == query.kind)
            .filter(|row| !(query.ignore_copy_only && row.is_copy_only))
            .filter(|row| query.since.is_none_or(|since| row.finished_at >= since))
            .cloned()
            .collect())
    }
}

impl ServerHandle for FakeSession {
    fn server_version(&self) -> Option<&str> {
        self.server.version.as_deref()
    }
}
