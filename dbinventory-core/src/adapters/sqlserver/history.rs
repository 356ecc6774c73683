//! Backup history lookups against `msdb.dbo.backupset`.

use super::SqlClient;
use super::row::{RowExt, fetch_rows, utc_to_local};
use crate::Result;
use crate::adapters::BackupHistoryQuery;
use crate::models::BackupHistoryRecord;
use chrono::FixedOffset;
use std::time::Duration;
use tiberius::Query;

/// Builds the aggregate query text; `@P1` is always the backup type and
/// `@P2` the threshold when one is given.
fn history_sql(query: &BackupHistoryQuery) -> String {
    let mut sql = String::from(
        "SELECT b.database_name, MAX(b.backup_finish_date) AS last_backup, \
         CAST(MIN(CAST(b.is_copy_only AS int)) AS int) AS all_copy_only \
         FROM msdb.dbo.backupset b \
         WHERE b.type = @P1 AND b.backup_finish_date IS NOT NULL",
    );
    if query.ignore_copy_only {
        sql.push_str(" AND b.is_copy_only = 0");
    }
    if query.since.is_some() {
        sql.push_str(" AND b.backup_finish_date >= @P2");
    }
    sql.push_str(" GROUP BY b.database_name ORDER BY b.database_name");
    sql
}

/// Last qualifying backup per database.
///
/// msdb stores server-local wall-clock times, so the threshold is bound in
/// the server's offset and results are converted back to UTC.
pub(super) async fn last_backups(
    client: &mut SqlClient,
    query: &BackupHistoryQuery,
    timeout: Duration,
    server_offset: FixedOffset,
) -> Result<Vec<BackupHistoryRecord>> {
    let context = "msdb.dbo.backupset";
    tracing::debug!(
        "Querying {} backup history (ignore_copy_only: {}, since: {:?})",
        query.kind,
        query.ignore_copy_only,
        query.since
    );

    let mut statement = Query::new(history_sql(query));
    statement.bind(query.kind.type_code());
    if let Some(since) = query.since {
        statement.bind(utc_to_local(since, server_offset));
    }

    let rows = fetch_rows(client, statement, timeout, context).await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let database_name: &str = row.require_field("database_name", context)?;
        let Some(finished_at) = row.get_timestamp("last_backup", context, server_offset)? else {
            continue;
        };
        let all_copy_only: i32 = row.get_field("all_copy_only", context)?.unwrap_or(0);

        records.push(BackupHistoryRecord {
            database_name: database_name.to_string(),
            kind: query.kind,
            finished_at,
            is_copy_only: all_copy_only != 0,
        });
    }

    tracing::debug!("{} databases have a qualifying {} backup", records.len(), query.kind);
    Ok(records)
}
