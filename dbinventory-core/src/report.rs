//! Report projection of inventory records.
//!
//! The reporter works from a fixed field list; the backup status note is
//! only part of it when a staleness policy was applied.

use crate::SqlInstance;
use crate::models::{DatabaseRecord, DatabaseStatus, RecoveryModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Columns every report carries, in display order.
pub const DISPLAY_FIELDS: &[&str] = &[
    "sql_instance",
    "name",
    "status",
    "recovery_model",
    "size_mb",
    "compatibility_level",
    "collation",
    "owner",
    "last_full_backup",
    "last_differential_backup",
    "last_log_backup",
];

/// Column appended when a staleness policy was active.
pub const BACKUP_STATUS_FIELD: &str = "backup_status";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Display fields for a report.
pub fn display_fields(staleness_active: bool) -> Vec<&'static str> {
    let mut fields = DISPLAY_FIELDS.to_vec();
    if staleness_active {
        fields.push(BACKUP_STATUS_FIELD);
    }
    fields
}

/// Stamps host and instance identity onto every record.
pub fn annotate(records: &mut [DatabaseRecord], instance: &SqlInstance) {
    let display = instance.to_string();
    for record in records {
        record.computer_name = Some(instance.computer_name().to_string());
        record.instance_name = Some(instance.instance_name().to_string());
        record.sql_instance = Some(display.clone());
    }
}

/// One reported database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Display identity of the instance
    pub sql_instance: String,
    /// Database name
    pub name: String,
    /// Lifecycle status
    pub status: DatabaseStatus,
    /// Recovery model
    pub recovery_model: RecoveryModel,
    /// Size in megabytes
    pub size_mb: f64,
    /// Compatibility level
    pub compatibility_level: u16,
    /// Default collation
    pub collation: String,
    /// Owning login
    pub owner: String,
    /// Latest full backup
    pub last_full_backup: Option<DateTime<Utc>>,
    /// Latest differential backup
    pub last_differential_backup: Option<DateTime<Utc>>,
    /// Latest log backup
    pub last_log_backup: Option<DateTime<Utc>>,
    /// `None` when no staleness policy ran; `Some("")` when it ran and left
    /// no note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_status: Option<String>,
}

impl ReportRow {
    /// Projects an annotated record.
    pub fn from_record(record: &DatabaseRecord, staleness_active: bool) -> Self {
        Self {
            sql_instance: record.sql_instance.clone().unwrap_or_default(),
            name: record.name.clone(),
            status: record.status,
            recovery_model: record.recovery_model,
            size_mb: record.size_mb,
            compatibility_level: record.compatibility_level,
            collation: record.collation.clone(),
            owner: record.owner.clone(),
            last_full_backup: record.last_full_backup,
            last_differential_backup: record.last_differential_backup,
            last_log_backup: record.last_log_backup,
            backup_status: staleness_active
                .then(|| record.backup_status.clone().unwrap_or_default()),
        }
    }

    /// Text cells in `display_fields` order.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = vec![
            self.sql_instance.clone(),
            self.name.clone(),
            self.status.to_string(),
            self.recovery_model.to_string(),
            format!("{:.2}", self.size_mb),
            self.compatibility_level.to_string(),
            self.collation.clone(),
            self.owner.clone(),
            format_timestamp(self.last_full_backup),
            format_timestamp(self.last_differential_backup),
            format_timestamp(self.last_log_backup),
        ];
        if let Some(note) = &self.backup_status {
            cells.push(note.clone());
        }
        cells
    }
}

fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ONLY_COPY_ONLY_NOTE;
    use chrono::TimeZone;

    fn annotated(name: &str) -> DatabaseRecord {
        let mut records = vec![DatabaseRecord::new(name)];
        annotate(&mut records, &SqlInstance::parse("sql01\\PROD").unwrap());
        records.remove(0)
    }

    #[test]
    fn test_annotate_sets_identity() {
        let record = annotated("sales");
        assert_eq!(record.computer_name.as_deref(), Some("sql01"));
        assert_eq!(record.instance_name.as_deref(), Some("PROD"));
        assert_eq!(record.sql_instance.as_deref(), Some("sql01\\PROD"));
    }

    #[test]
    fn test_display_fields_include_note_only_when_active() {
        assert!(!display_fields(false).contains(&BACKUP_STATUS_FIELD));
        assert_eq!(display_fields(true).last(), Some(&BACKUP_STATUS_FIELD));
        assert_eq!(display_fields(true).len(), DISPLAY_FIELDS.len() + 1);
    }

    #[test]
    fn test_cells_align_with_fields() {
        let mut record = annotated("sales");
        record.last_full_backup = Some(Utc.with_ymd_and_hms(2024, 5, 1, 3, 4, 5).unwrap());
        record.backup_status = Some(ONLY_COPY_ONLY_NOTE.to_string());

        let inactive = ReportRow::from_record(&record, false);
        assert_eq!(inactive.cells().len(), display_fields(false).len());
        assert_eq!(inactive.cells()[8], "2024-05-01 03:04:05");

        let active = ReportRow::from_record(&record, true);
        assert_eq!(active.cells().len(), display_fields(true).len());
        assert_eq!(active.cells().last().map(String::as_str), Some(ONLY_COPY_ONLY_NOTE));
    }

    #[test]
    fn test_backup_status_omitted_from_json_when_inactive() {
        let record = annotated("sales");

        let json = serde_json::to_value(ReportRow::from_record(&record, false)).unwrap();
        assert!(json.get(BACKUP_STATUS_FIELD).is_none());

        let json = serde_json::to_value(ReportRow::from_record(&record, true)).unwrap();
        assert_eq!(json[BACKUP_STATUS_FIELD], "");
    }
}
