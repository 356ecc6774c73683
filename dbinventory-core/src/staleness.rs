//! Backup staleness evaluation.
//!
//! Narrows a selected working set down to the databases whose full and/or
//! log backups are missing or older than a threshold, cross-referencing the
//! backup history collaborator. Copy-only backups never count as real
//! backups here.

use crate::adapters::{BackupHistoryProvider, BackupHistoryQuery};
use crate::error::InventoryError;
use crate::filter::NameComparison;
use crate::models::{BackupKind, DatabaseRecord, ONLY_COPY_ONLY_NOTE, SCRATCH_DATABASE};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Staleness rule for one backup type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StalenessRule {
    /// Report databases with no qualifying backup at all
    NoBackup,
    /// Report databases with no qualifying backup since the timestamp
    NoBackupSince(DateTime<Utc>),
}

impl StalenessRule {
    /// Threshold timestamp, if the rule has one
    pub fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            StalenessRule::NoBackup => None,
            StalenessRule::NoBackupSince(since) => Some(*since),
        }
    }
}

/// Full and log staleness rules, each optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    /// Rule for full backups
    pub full: Option<StalenessRule>,
    /// Rule for transaction log backups
    pub log: Option<StalenessRule>,
}

impl StalenessPolicy {
    /// Creates an inactive policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full-backup rule.
    pub fn with_full(mut self, rule: StalenessRule) -> Self {
        self.full = Some(rule);
        self
    }

    /// Sets the log-backup rule.
    pub fn with_log(mut self, rule: StalenessRule) -> Self {
        self.log = Some(rule);
        self
    }

    /// Whether any rule is set
    pub fn is_active(&self) -> bool {
        self.full.is_some() || self.log.is_some()
    }

    /// Threshold for the secondary record-timestamp filter.
    ///
    /// The full-backup threshold wins over the log threshold even when both
    /// rules are active, and the returned kind says which record timestamp
    /// is compared.
    // NOTE: single-threshold precedence kept for output compatibility with
    // existing reports; it looks unintended when both rules are set.
    pub fn secondary_threshold(&self) -> Option<(BackupKind, DateTime<Utc>)> {
        if let Some(since) = self.full.and_then(|rule| rule.since()) {
            return Some((BackupKind::Full, since));
        }
        self.log
            .and_then(|rule| rule.since())
            .map(|since| (BackupKind::Log, since))
    }
}

/// The evaluator's view of backup history: names of databases that have at
/// least one qualifying backup.
#[async_trait]
pub trait BackupHistoryLookup: Send {
    /// Names with at least one backup matching the query.
    async fn last_backups(&mut self, query: &BackupHistoryQuery) -> Result<BTreeSet<String>>;
}

#[async_trait]
impl<T> BackupHistoryLookup for T
where
    T: BackupHistoryProvider + ?Sized,
{
    async fn last_backups(&mut self, query: &BackupHistoryQuery) -> Result<BTreeSet<String>> {
        let rows = self.backup_history(query).await?;
        Ok(rows.into_iter().map(|row| row.database_name).collect())
    }
}

/// Applies the staleness policy to a working set.
///
/// Returns a new sequence; the input is left untouched. With an inactive
/// policy this is an identity pass and the history lookup is never called.
///
/// # Errors
/// Any lookup failure is surfaced as `HistoryLookupFailed` tagged with
/// `instance`; a failed lookup is never read as "no backups".
pub async fn apply_staleness<H>(
    working_set: &[DatabaseRecord],
    policy: &StalenessPolicy,
    history: &mut H,
    instance: &str,
    comparison: NameComparison,
) -> Result<Vec<DatabaseRecord>>
where
    H: BackupHistoryLookup + ?Sized,
{
    if !policy.is_active() {
        return Ok(working_set.to_vec());
    }

    let mut current = working_set.to_vec();

    if let Some(rule) = policy.full {
        let backed_up = lookup(history, BackupKind::Full, rule, instance).await?;
        current.retain(|db| {
            !comparison.matches(SCRATCH_DATABASE, &db.name)
                && !contains_name(&backed_up, &db.name, comparison)
        });
        tracing::debug!(
            "{}: {} databases without a qualifying full backup",
            instance,
            current.len()
        );
    }

    if let Some(rule) = policy.log {
        let backed_up = lookup(history, BackupKind::Log, rule, instance).await?;
        current.retain(|db| {
            if !db.recovery_model.supports_log_backups() {
                tracing::trace!(
                    "{}: skipping {} ({} recovery) for log staleness",
                    instance,
                    db.name,
                    db.recovery_model
                );
                return false;
            }
            !comparison.matches(SCRATCH_DATABASE, &db.name)
                && !contains_name(&backed_up, &db.name, comparison)
        });
        tracing::debug!(
            "{}: {} databases without a qualifying log backup",
            instance,
            current.len()
        );
    }

    if let Some((kind, threshold)) = policy.secondary_threshold() {
        current.retain(|db| db.last_backup(kind).is_none_or(|last| last < threshold));
    }

    if policy.full.is_some() {
        for db in &mut current {
            db.backup_status = db
                .has_only_copy_only_backups()
                .then(|| ONLY_COPY_ONLY_NOTE.to_string());
        }
    }

    Ok(current)
}

async fn lookup<H>(
    history: &mut H,
    kind: BackupKind,
    rule: StalenessRule,
    instance: &str,
) -> Result<BTreeSet<String>>
where
    H: BackupHistoryLookup + ?Sized,
{
    let query = BackupHistoryQuery {
        kind,
        ignore_copy_only: true,
        since: rule.since(),
    };

    history.last_backups(&query).await.map_err(|e| match e {
        InventoryError::HistoryLookupFailed { .. } => e,
        other => InventoryError::history_lookup_failed(instance, other),
    })
}

fn contains_name(names: &BTreeSet<String>, name: &str, comparison: NameComparison) -> bool {
    names.iter().any(|candidate| comparison.matches(candidate, name))
}
