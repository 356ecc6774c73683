//! Core data structures and pipeline for dbinventory.
//!
//! This crate holds the database inventory model, the filter selector, the
//! backup staleness evaluator and the per-instance batch pipeline shared by
//! the `dbinventory` binary. Server access sits behind collaborator traits
//! so the pipeline can run against in-memory fakes.
//!
//! # Security Guarantees
//! - No credentials stored or logged in any data structures
//! - All database operations are read-only catalog queries
//! - Driver errors are sanitized before they reach callers
//!
//! # Architecture
//! - Collaborator traits for connection, enumeration and backup history
//! - Factory function for the compiled-in SQL Server provider
//! - Tagged-union filter requests validated once, before any connection

pub mod adapters;
pub mod error;
pub mod filter;
pub mod instance;
pub mod inventory;
pub mod logging;
pub mod models;
pub mod report;
pub mod security;
pub mod staleness;

// Re-export commonly used types
pub use adapters::{
    BackupHistoryProvider, BackupHistoryQuery, ConnectionConfig, ConnectionProvider,
    DatabaseEnumerator, ServerHandle, create_provider,
};
pub use error::{FailureKind, InventoryError, Result};
pub use filter::{FilterCriteria, FilterRequest, NameComparison, PrimaryFilter, select};
pub use instance::SqlInstance;
pub use inventory::{
    BatchConfig, BatchResult, InstanceFailure, InstanceInventory, InventoryCriteria,
    InventoryRequest, inventory_batch, inventory_instance,
};
pub use logging::init_logging;
pub use models::{
    AccessMode, BackupHistoryRecord, BackupKind, DatabaseRecord, DatabaseStatus, RecoveryModel,
};
pub use report::{ReportRow, display_fields};
pub use staleness::{StalenessPolicy, StalenessRule, apply_staleness};
