//! Core data models for database inventory.
//!
//! Records are immutable snapshots read once per invocation. The only
//! fields mutated after enumeration are the annotations (host/instance
//! identity and the derived backup status note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The server's temporary-workspace database, never part of backup reporting.
pub const SCRATCH_DATABASE: &str = "tempdb";

/// Databases SQL Server creates for itself.
pub const SYSTEM_DATABASES: &[&str] = &["master", SCRATCH_DATABASE, "model", "msdb"];

/// Note attached to databases whose every recorded backup is copy-only.
pub const ONLY_COPY_ONLY_NOTE: &str = "Only CopyOnly backups";

/// Lifecycle status of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseStatus {
    /// Online and accepting connections
    Normal,
    /// Taken offline
    Offline,
    /// Running or waiting on crash recovery
    Recovering,
    /// A restore is in progress
    Restoring,
    /// Read-only standby between log restores
    Standby,
    /// Recovery failed and the database is unusable
    Suspect,
    /// Emergency mode, single-user read-only
    EmergencyMode,
}

impl DatabaseStatus {
    /// All statuses, in display order.
    pub const ALL: [DatabaseStatus; 7] = [
        DatabaseStatus::Normal,
        DatabaseStatus::Offline,
        DatabaseStatus::Recovering,
        DatabaseStatus::Restoring,
        DatabaseStatus::Standby,
        DatabaseStatus::Suspect,
        DatabaseStatus::EmergencyMode,
    ];

    /// Maps `sys.databases.state_desc` plus the standby flag.
    ///
    /// Unknown states map to `None` so callers can log and skip them.
    pub fn from_state_desc(state_desc: &str, is_in_standby: bool) -> Option<Self> {
        if is_in_standby {
            return Some(DatabaseStatus::Standby);
        }
        match state_desc.to_ascii_uppercase().as_str() {
            "ONLINE" => Some(DatabaseStatus::Normal),
            "OFFLINE" | "OFFLINE_SECONDARY" => Some(DatabaseStatus::Offline),
            "RECOVERING" | "RECOVERY_PENDING" => Some(DatabaseStatus::Recovering),
            "RESTORING" => Some(DatabaseStatus::Restoring),
            "SUSPECT" => Some(DatabaseStatus::Suspect),
            "EMERGENCY" => Some(DatabaseStatus::EmergencyMode),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseStatus::Normal => write!(f, "Normal"),
            DatabaseStatus::Offline => write!(f, "Offline"),
            DatabaseStatus::Recovering => write!(f, "Recovering"),
            DatabaseStatus::Restoring => write!(f, "Restoring"),
            DatabaseStatus::Standby => write!(f, "Standby"),
            DatabaseStatus::Suspect => write!(f, "Suspect"),
            DatabaseStatus::EmergencyMode => write!(f, "EmergencyMode"),
        }
    }
}

impl std::str::FromStr for DatabaseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DatabaseStatus::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown status '{}' (expected one of: {})",
                    s,
                    DatabaseStatus::ALL.map(|v| v.to_string()).join(", ")
                )
            })
    }
}

/// Per-database recovery model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryModel {
    /// Full recovery: log backups required
    Full,
    /// Simple recovery: no log backups
    Simple,
    /// Bulk-logged recovery: log backups required
    BulkLogged,
}

impl RecoveryModel {
    /// Whether log backups are meaningful under this model.
    pub fn supports_log_backups(self) -> bool {
        !matches!(self, RecoveryModel::Simple)
    }

    /// Maps `sys.databases.recovery_model_desc`.
    pub fn from_desc(desc: &str) -> Option<Self> {
        match desc.to_ascii_uppercase().as_str() {
            "FULL" => Some(RecoveryModel::Full),
            "SIMPLE" => Some(RecoveryModel::Simple),
            "BULK_LOGGED" | "BULKLOGGED" => Some(RecoveryModel::BulkLogged),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecoveryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryModel::Full => write!(f, "Full"),
            RecoveryModel::Simple => write!(f, "Simple"),
            RecoveryModel::BulkLogged => write!(f, "BulkLogged"),
        }
    }
}

impl std::str::FromStr for RecoveryModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RecoveryModel::from_desc(s).ok_or_else(|| {
            format!(
                "unknown recovery model '{}' (expected Full, Simple or BulkLogged)",
                s
            )
        })
    }
}

/// Database access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// `READ_ONLY`
    ReadOnly,
    /// `READ_WRITE`
    ReadWrite,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::ReadOnly => write!(f, "ReadOnly"),
            AccessMode::ReadWrite => write!(f, "ReadWrite"),
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "readonly" => Ok(AccessMode::ReadOnly),
            "readwrite" => Ok(AccessMode::ReadWrite),
            _ => Err(format!(
                "unknown access mode '{}' (expected ReadOnly or ReadWrite)",
                s
            )),
        }
    }
}

/// Backup types the history collaborator can be asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupKind {
    /// Full database backups
    Full,
    /// Transaction log backups
    Log,
}

impl BackupKind {
    /// `msdb.dbo.backupset.type` code
    pub fn type_code(self) -> &'static str {
        match self {
            BackupKind::Full => "D",
            BackupKind::Log => "L",
        }
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupKind::Full => write!(f, "full"),
            BackupKind::Log => write!(f, "log"),
        }
    }
}

/// Kind of a recorded backup set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupSetKind {
    /// Type `D`
    Full,
    /// Type `I`
    Differential,
    /// Type `L`
    Log,
    /// File, filegroup and partial backups
    Other,
}

impl BackupSetKind {
    /// Maps `msdb.dbo.backupset.type`.
    pub fn from_type_code(code: &str) -> Self {
        match code {
            "D" => BackupSetKind::Full,
            "I" => BackupSetKind::Differential,
            "L" => BackupSetKind::Log,
            _ => BackupSetKind::Other,
        }
    }
}

/// Recorded backups of one kind and copy-only flag for a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSet {
    /// Backup type from `msdb.dbo.backupset.type`
    pub kind: BackupSetKind,
    /// Whether these backups were taken `COPY_ONLY`
    pub is_copy_only: bool,
    /// Latest finish time in UTC
    pub finished_at: Option<DateTime<Utc>>,
}

/// Snapshot of one database on one server instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    /// Database name
    pub name: String,
    /// Whether this is one of the built-in system databases
    pub is_system_object: bool,
    /// Lifecycle status
    pub status: DatabaseStatus,
    /// Recovery model
    pub recovery_model: RecoveryModel,
    /// Whether the database is `READ_ONLY`
    pub read_only: bool,
    /// Whether transparent data encryption is on
    pub encryption_enabled: bool,
    /// Owning login name
    pub owner: String,
    /// Total data and log file size in megabytes
    pub size_mb: f64,
    /// Compatibility level, e.g. 160
    pub compatibility_level: u16,
    /// Default collation
    pub collation: String,
    /// Latest non-copy-only full backup
    pub last_full_backup: Option<DateTime<Utc>>,
    /// Latest non-copy-only differential backup
    pub last_differential_backup: Option<DateTime<Utc>>,
    /// Latest non-copy-only log backup
    pub last_log_backup: Option<DateTime<Utc>>,
    /// Backup-set descriptors, loaded only when requested
    pub backup_sets: Vec<BackupSet>,
    /// Host the instance runs on (annotation)
    pub computer_name: Option<String>,
    /// Instance name, `MSSQLSERVER` for the default instance (annotation)
    pub instance_name: Option<String>,
    /// Display identity of the instance (annotation)
    pub sql_instance: Option<String>,
    /// Derived backup status note (annotation)
    pub backup_status: Option<String>,
}

impl DatabaseRecord {
    /// Creates an online, read-write, full-recovery user database record.
    ///
    /// Enumerators overwrite every field they read from the server.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_system_object = SYSTEM_DATABASES.contains(&name.as_str());
        Self {
            name,
            is_system_object,
            status: DatabaseStatus::Normal,
            recovery_model: RecoveryModel::Full,
            read_only: false,
            encryption_enabled: false,
            owner: String::new(),
            size_mb: 0.0,
            compatibility_level: 0,
            collation: String::new(),
            last_full_backup: None,
            last_differential_backup: None,
            last_log_backup: None,
            backup_sets: Vec::new(),
            computer_name: None,
            instance_name: None,
            sql_instance: None,
            backup_status: None,
        }
    }

    /// Access mode derived from the read-only flag
    pub fn access_mode(&self) -> AccessMode {
        if self.read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        }
    }

    /// True when at least one backup set exists and all of them are copy-only.
    pub fn has_only_copy_only_backups(&self) -> bool {
        !self.backup_sets.is_empty() && self.backup_sets.iter().all(|set| set.is_copy_only)
    }

    /// Last recorded backup timestamp of the given kind.
    pub fn last_backup(&self, kind: BackupKind) -> Option<DateTime<Utc>> {
        match kind {
            BackupKind::Full => self.last_full_backup,
            BackupKind::Log => self.last_log_backup,
        }
    }
}

/// One row returned by the backup history collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHistoryRecord {
    /// Database the backups belong to
    pub database_name: String,
    /// Backup type asked about
    pub kind: BackupKind,
    /// Latest qualifying finish time
    pub finished_at: DateTime<Utc>,
    /// Whether every qualifying backup was copy-only
    pub is_copy_only: bool,
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
