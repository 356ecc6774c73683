//! Database enumeration from the SQL Server catalog.

use super::SqlClient;
use super::row::{RowExt, fetch_rows};
use crate::Result;
use crate::models::{BackupSet, BackupSetKind, DatabaseRecord, DatabaseStatus, RecoveryModel};
use chrono::FixedOffset;
use std::collections::HashMap;
use std::time::Duration;
use tiberius::Query;

/// `database_id` values at or below this are the built-in system databases.
const LAST_SYSTEM_DATABASE_ID: i32 = 4;

const DATABASES_QUERY: &str = r#"
    SELECT
        d.name,
        d.database_id,
        d.state_desc,
        d.is_in_standby,
        d.recovery_model_desc,
        d.is_read_only,
        d.is_encrypted,
        SUSER_SNAME(d.owner_sid) AS owner_name,
        CAST(ISNULL((
            SELECT SUM(CAST(mf.size AS bigint))
            FROM sys.master_files mf
            WHERE mf.database_id = d.database_id
        ), 0) * 8 / 1024.0 AS float) AS size_mb,
        CAST(d.compatibility_level AS int) AS compatibility_level,
        d.collation_name,
        (SELECT MAX(b.backup_finish_date) FROM msdb.dbo.backupset b
            WHERE b.database_name = d.name AND b.type = 'D'
                AND b.is_copy_only = 0) AS last_full_backup,
        (SELECT MAX(b.backup_finish_date) FROM msdb.dbo.backupset b
            WHERE b.database_name = d.name AND b.type = 'I'
                AND b.is_copy_only = 0) AS last_diff_backup,
        (SELECT MAX(b.backup_finish_date) FROM msdb.dbo.backupset b
            WHERE b.database_name = d.name AND b.type = 'L'
                AND b.is_copy_only = 0) AS last_log_backup
    FROM sys.databases d
    ORDER BY d.name
"#;

/// One row per database, backup type and copy-only flag, so the result
/// stays proportional to the number of databases rather than to msdb's
/// retained history.
const BACKUP_SETS_QUERY: &str = r#"
    SELECT
        b.database_name,
        b.type,
        b.is_copy_only,
        MAX(b.backup_finish_date) AS backup_finish_date
    FROM msdb.dbo.backupset b
    WHERE b.database_name IN (SELECT d.name FROM sys.databases d)
    GROUP BY b.database_name, b.type, b.is_copy_only
    ORDER BY b.database_name, b.type, b.is_copy_only
"#;

/// Lists every database on the instance, ordered by name.
///
/// Databases reporting a state or recovery model outside the known set are
/// logged and skipped rather than guessed at.
pub(super) async fn list_databases(
    client: &mut SqlClient,
    timeout: Duration,
    server_offset: FixedOffset,
    include_backup_sets: bool,
) -> Result<Vec<DatabaseRecord>> {
    tracing::debug!(
        "Listing databases (include_backup_sets: {})",
        include_backup_sets
    );

    let rows = fetch_rows(client, Query::new(DATABASES_QUERY), timeout, "sys.databases").await?;

    let mut databases = Vec::with_capacity(rows.len());
    for row in &rows {
        let context = "sys.databases";
        let name: &str = row.require_field("name", context)?;
        let database_id: i32 = row.require_field("database_id", context)?;
        let state_desc: &str = row.require_field("state_desc", context)?;
        let is_in_standby: bool = row.get_field("is_in_standby", context)?.unwrap_or(false);
        let recovery_desc: &str = row.require_field("recovery_model_desc", context)?;

        let Some(status) = DatabaseStatus::from_state_desc(state_desc, is_in_standby) else {
            tracing::warn!("Skipping database {} with unknown state {}", name, state_desc);
            continue;
        };
        let Some(recovery_model) = RecoveryModel::from_desc(recovery_desc) else {
            tracing::warn!(
                "Skipping database {} with unknown recovery model {}",
                name,
                recovery_desc
            );
            continue;
        };

        let compatibility_level: i32 = row.get_field("compatibility_level", context)?.unwrap_or(0);

        let mut record = DatabaseRecord::new(name);
        record.is_system_object = database_id <= LAST_SYSTEM_DATABASE_ID;
        record.status = status;
        record.recovery_model = recovery_model;
        record.read_only = row.get_field("is_read_only", context)?.unwrap_or(false);
        record.encryption_enabled = row.get_field("is_encrypted", context)?.unwrap_or(false);
        record.owner = row
            .get_field::<&str>("owner_name", context)?
            .unwrap_or_default()
            .to_string();
        record.size_mb = row.get_field("size_mb", context)?.unwrap_or(0.0);
        record.compatibility_level = u16::try_from(compatibility_level).unwrap_or(0);
        record.collation = row
            .get_field::<&str>("collation_name", context)?
            .unwrap_or_default()
            .to_string();
        record.last_full_backup = row.get_timestamp("last_full_backup", context, server_offset)?;
        record.last_differential_backup =
            row.get_timestamp("last_diff_backup", context, server_offset)?;
        record.last_log_backup = row.get_timestamp("last_log_backup", context, server_offset)?;

        tracing::trace!(
            "Found database: {} (status: {}, recovery: {}, system: {})",
            record.name,
            record.status,
            record.recovery_model,
            record.is_system_object
        );

        databases.push(record);
    }

    if include_backup_sets {
        let mut sets = list_backup_sets(client, timeout, server_offset).await?;
        for record in &mut databases {
            record.backup_sets = sets.remove(&record.name).unwrap_or_default();
        }
    }

    tracing::debug!("Enumerated {} databases", databases.len());
    Ok(databases)
}

/// Reads backup-set descriptors grouped by database name.
///
/// Each descriptor stands for every backup of one type and copy-only flag
/// and carries the latest finish time among them.
async fn list_backup_sets(
    client: &mut SqlClient,
    timeout: Duration,
    server_offset: FixedOffset,
) -> Result<HashMap<String, Vec<BackupSet>>> {
    let context = "msdb.dbo.backupset";
    let rows = fetch_rows(client, Query::new(BACKUP_SETS_QUERY), timeout, context).await?;

    let mut sets: HashMap<String, Vec<BackupSet>> = HashMap::new();
    for row in &rows {
        let Some(database_name) = row.get_field::<&str>("database_name", context)? else {
            continue;
        };
        let type_code: &str = row.get_field("type", context)?.unwrap_or("");
        sets.entry(database_name.to_string())
            .or_default()
            .push(BackupSet {
                kind: BackupSetKind::from_type_code(type_code.trim()),
                is_copy_only: row.get_field("is_copy_only", context)?.unwrap_or(false),
                finished_at: row.get_timestamp("backup_finish_date", context, server_offset)?,
            });
    }

    tracing::debug!("Loaded backup-set descriptors for {} databases", sets.len());
    Ok(sets)
}
