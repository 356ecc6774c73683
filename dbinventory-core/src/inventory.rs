//! Per-instance inventory pipeline and multi-instance batches.
//!
//! Each instance runs connect → enumerate → select → staleness → annotate.
//! A failure on one instance is recorded against that instance and the
//! batch carries on with the rest.
//!
//! # Security
//! - Credentials are borrowed for the connect call only
//! - Failure messages come from sanitized errors

use crate::adapters::{ConnectionProvider, ServerHandle};
use crate::error::{FailureKind, InventoryError};
use crate::filter::{FilterCriteria, FilterRequest, NameComparison, select};
use crate::models::DatabaseRecord;
use crate::report::{ReportRow, annotate};
use crate::security::Credentials;
use crate::staleness::{StalenessPolicy, apply_staleness};
use crate::{Result, SqlInstance};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Validated, credential-free description of what to report.
#[derive(Debug, Clone, Default)]
pub struct InventoryRequest {
    /// Which databases to select
    pub filter: FilterRequest,
    /// Backup staleness narrowing, inactive by default
    pub staleness: StalenessPolicy,
}

impl InventoryRequest {
    /// Creates a request from a validated filter and a staleness policy.
    pub fn new(filter: FilterRequest, staleness: StalenessPolicy) -> Self {
        Self { filter, staleness }
    }
}

/// Unvalidated inputs for a batch, as collected from a caller.
#[derive(Debug, Clone, Default)]
pub struct InventoryCriteria {
    /// Raw selection flags, validated by `into_request`
    pub filter: FilterCriteria,
    /// Backup staleness narrowing
    pub staleness: StalenessPolicy,
    /// How database and login names are matched
    pub comparison: NameComparison,
}

impl InventoryCriteria {
    /// Validates the filter flags.
    ///
    /// # Errors
    /// Returns `ConflictingFilters` when two primary criteria are set.
    pub fn into_request(self) -> Result<InventoryRequest> {
        let filter = self.filter.into_request(self.comparison)?;
        Ok(InventoryRequest::new(filter, self.staleness))
    }
}

/// Batch execution settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Instances processed at once. `1` runs them strictly one after another.
    /// Default: 1
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

impl BatchConfig {
    /// Creates a sequential configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of instances processed concurrently.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Report for one successfully processed instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInventory {
    /// Display identity of the instance
    pub instance: String,
    /// `SERVERPROPERTY('ProductVersion')`, when readable
    pub server_version: Option<String>,
    /// Reported databases, annotated
    pub databases: Vec<DatabaseRecord>,
    /// When the instance finished
    pub collected_at: DateTime<Utc>,
}

impl InstanceInventory {
    /// Report rows for this instance.
    pub fn rows(&self, staleness_active: bool) -> Vec<ReportRow> {
        self.databases
            .iter()
            .map(|record| ReportRow::from_record(record, staleness_active))
            .collect()
    }
}

/// An instance that could not be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFailure {
    /// Display identity of the instance
    pub instance: String,
    /// Failure classification
    pub kind: FailureKind,
    /// Sanitized error message
    pub message: String,
}

/// Statistics about a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the batch
    pub total_duration_ms: u64,
    /// Instances in the batch
    pub instances_requested: usize,
    /// Instances reported
    pub instances_succeeded: usize,
    /// Instances that failed
    pub instances_failed: usize,
    /// Databases across all reported instances
    pub databases_reported: usize,
    /// Whether the report carries the backup status column
    pub staleness_active: bool,
    /// Version of the tool that produced the report
    pub tool_version: String,
}

/// Results of a batch: successes and failures, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Reported instances
    pub instances: Vec<InstanceInventory>,
    /// Instances that could not be reported
    pub failures: Vec<InstanceFailure>,
    /// Run statistics
    pub metadata: BatchMetadata,
}

impl BatchResult {
    /// True when no instance failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Report rows across all instances.
    pub fn rows(&self) -> Vec<ReportRow> {
        self.instances
            .iter()
            .flat_map(|inventory| inventory.rows(self.metadata.staleness_active))
            .collect()
    }
}

/// Inventories a single instance.
///
/// # Errors
/// Every error is tagged with the instance identity: `ConnectionFailed`,
/// `Enumeration` or `HistoryLookupFailed`.
pub async fn inventory_instance(
    provider: &dyn ConnectionProvider,
    instance: &SqlInstance,
    credentials: &Credentials,
    request: &InventoryRequest,
) -> Result<InstanceInventory> {
    let identity = instance.to_string();
    tracing::info!("Inventorying {}", identity);

    let mut handle = connect(provider, instance, credentials, &identity).await?;

    let include_backup_sets = request.staleness.full.is_some();
    let databases = handle
        .enumerate_databases(include_backup_sets)
        .await
        .map_err(|e| match e {
            InventoryError::Enumeration { .. } => e,
            other => InventoryError::enumeration_failed(&identity, other),
        })?;

    let selected = select(&databases, &request.filter);
    let mut reported = apply_staleness(
        &selected,
        &request.staleness,
        handle.as_mut(),
        &identity,
        request.filter.comparison,
    )
    .await?;

    annotate(&mut reported, instance);

    tracing::info!(
        "{}: reporting {} of {} databases",
        identity,
        reported.len(),
        databases.len()
    );

    Ok(InstanceInventory {
        instance: identity,
        server_version: handle.server_version().map(str::to_string),
        databases: reported,
        collected_at: Utc::now(),
    })
}

/// Inventories every instance and collects per-instance failures.
///
/// The criteria are validated once, before any connection is attempted.
///
/// # Errors
/// Only `ConflictingFilters` is returned; instance failures are recorded in
/// [`BatchResult::failures`].
///
/// # Example
/// ```rust,no_run
/// use dbinventory_core::adapters::{ConnectionConfig, create_provider};
/// use dbinventory_core::inventory::{BatchConfig, InventoryCriteria, inventory_batch};
/// use dbinventory_core::{SqlInstance, security::Credentials};
///
/// # async fn example() -> dbinventory_core::Result<()> {
/// let provider = create_provider(ConnectionConfig::default())?;
/// let instances = vec![SqlInstance::parse("sql01")?, SqlInstance::parse("sql02\\DEV")?];
/// let credentials = Credentials::new("inventory".to_string(), Some("secret".to_string()));
///
/// let result = inventory_batch(
///     provider.as_ref(),
///     &instances,
///     &credentials,
///     InventoryCriteria::default(),
///     &BatchConfig::default(),
/// )
/// .await?;
/// println!("{} databases", result.metadata.databases_reported);
/// # Ok(())
/// # }
/// ```
pub async fn inventory_batch(
    provider: &dyn ConnectionProvider,
    instances: &[SqlInstance],
    credentials: &Credentials,
    criteria: InventoryCriteria,
    config: &BatchConfig,
) -> Result<BatchResult> {
    let request = criteria.into_request()?;

    let start_time = Instant::now();
    let started_at = Utc::now();
    let max_concurrency = config.max_concurrency.max(1);

    tracing::info!(
        "Starting inventory of {} instance(s) (filter: {}, staleness: {}, max_concurrency: {})",
        instances.len(),
        request.filter.primary.label(),
        request.staleness.is_active(),
        max_concurrency
    );

    let request = &request;
    let runs = instances.iter().map(|instance| async move {
        let outcome = inventory_instance(provider, instance, credentials, request).await;
        (instance, outcome)
    });

    // `buffered` keeps input order whatever the concurrency
    let outcomes: Vec<_> = stream::iter(runs).buffered(max_concurrency).collect().await;

    let mut inventories = Vec::new();
    let mut failures = Vec::new();
    for (instance, outcome) in outcomes {
        match outcome {
            Ok(inventory) => inventories.push(inventory),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", instance, e);
                failures.push(InstanceFailure {
                    instance: e
                        .instance()
                        .map(str::to_string)
                        .unwrap_or_else(|| instance.to_string()),
                    kind: e.failure_kind(),
                    message: e.to_string(),
                });
            }
        }
    }

    let total_duration = start_time.elapsed();
    let databases_reported = inventories.iter().map(|i| i.databases.len()).sum();

    let metadata = BatchMetadata {
        started_at,
        total_duration_ms: u64::try_from(total_duration.as_millis()).unwrap_or(u64::MAX),
        instances_requested: instances.len(),
        instances_succeeded: inventories.len(),
        instances_failed: failures.len(),
        databases_reported,
        staleness_active: request.staleness.is_active(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    tracing::info!(
        "Inventory completed in {:.2}s: {} succeeded, {} failed, {} databases",
        total_duration.as_secs_f64(),
        metadata.instances_succeeded,
        metadata.instances_failed,
        databases_reported
    );

    Ok(BatchResult {
        instances: inventories,
        failures,
        metadata,
    })
}

/// Connects and returns the reported server version, without enumerating.
///
/// # Errors
/// Returns `ConnectionFailed` tagged with the instance identity.
pub async fn check_connection(
    provider: &dyn ConnectionProvider,
    instance: &SqlInstance,
    credentials: &Credentials,
) -> Result<Option<String>> {
    let identity = instance.to_string();
    let handle = connect(provider, instance, credentials, &identity).await?;
    Ok(handle.server_version().map(str::to_string))
}

async fn connect(
    provider: &dyn ConnectionProvider,
    instance: &SqlInstance,
    credentials: &Credentials,
    identity: &str,
) -> Result<Box<dyn ServerHandle>> {
    provider
        .connect(instance, credentials)
        .await
        .map_err(|e| match e {
            InventoryError::ConnectionFailed { .. } => e,
            other => InventoryError::connection_failed(identity, other),
        })
}
