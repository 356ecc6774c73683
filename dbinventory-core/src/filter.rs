//! Filter selection over enumerated databases.
//!
//! A [`FilterRequest`] holds at most one primary criterion as a tagged
//! union, so there is no order in which branches could overwrite each
//! other. Raw flag sets are validated once by [`FilterCriteria::into_request`];
//! [`select`] itself cannot fail.

use crate::Result;
use crate::error::InventoryError;
use crate::models::{AccessMode, DatabaseRecord, DatabaseStatus, RecoveryModel};

/// How database and login names are compared.
///
/// SQL Server's default collation is case-insensitive, which is why that
/// is the default; callers that know the server collation can pass
/// `CaseSensitive` or their own comparison.
#[derive(Clone, Copy, Default)]
pub enum NameComparison {
    /// Names compared after lowercasing
    #[default]
    CaseInsensitive,
    /// Exact byte comparison
    CaseSensitive,
    /// Caller-supplied comparison, called as `(wanted, record_name)`
    Custom(fn(&str, &str) -> bool),
}

impl NameComparison {
    /// Compares a wanted name (`left`) against a record name (`right`).
    pub fn matches(&self, left: &str, right: &str) -> bool {
        match self {
            NameComparison::CaseInsensitive => left.to_lowercase() == right.to_lowercase(),
            NameComparison::CaseSensitive => left == right,
            NameComparison::Custom(compare) => compare(left, right),
        }
    }

    /// Whether `name` appears in `names`.
    pub fn contains<S: AsRef<str>>(&self, names: &[S], name: &str) -> bool {
        names.iter().any(|candidate| self.matches(candidate.as_ref(), name))
    }
}

impl std::fmt::Debug for NameComparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameComparison::CaseInsensitive => write!(f, "CaseInsensitive"),
            NameComparison::CaseSensitive => write!(f, "CaseSensitive"),
            NameComparison::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// The single active selection criterion
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PrimaryFilter {
    /// No criterion: every database on the instance
    #[default]
    All,
    /// Only the built-in system databases
    SystemOnly,
    /// Only user databases
    UserOnly,
    /// Databases whose name is in the list
    Names(Vec<String>),
    /// Databases in the given lifecycle status
    Status(DatabaseStatus),
    /// Databases owned by one of the listed logins
    Owners(Vec<String>),
    /// Databases with the given access mode
    Access(AccessMode),
    /// Databases with transparent data encryption enabled
    Encrypted,
    /// Databases using the given recovery model
    RecoveryModel(RecoveryModel),
}

impl PrimaryFilter {
    /// Short label used in logs and conflict errors.
    pub fn label(&self) -> &'static str {
        match self {
            PrimaryFilter::All => "all",
            PrimaryFilter::SystemOnly => "system-only",
            PrimaryFilter::UserOnly => "user-only",
            PrimaryFilter::Names(_) => "database",
            PrimaryFilter::Status(_) => "status",
            PrimaryFilter::Owners(_) => "owner",
            PrimaryFilter::Access(_) => "access",
            PrimaryFilter::Encrypted => "encrypted",
            PrimaryFilter::RecoveryModel(_) => "recovery-model",
        }
    }

    /// Evaluates the predicate for one record.
    pub fn matches(&self, record: &DatabaseRecord, comparison: NameComparison) -> bool {
        match self {
            PrimaryFilter::All => true,
            PrimaryFilter::SystemOnly => record.is_system_object,
            PrimaryFilter::UserOnly => !record.is_system_object,
            PrimaryFilter::Names(names) => comparison.contains(names, &record.name),
            PrimaryFilter::Status(status) => record.status == *status,
            PrimaryFilter::Owners(owners) => comparison.contains(owners, &record.owner),
            PrimaryFilter::Access(AccessMode::ReadOnly) => record.read_only,
            PrimaryFilter::Access(AccessMode::ReadWrite) => !record.read_only,
            PrimaryFilter::Encrypted => record.encryption_enabled,
            PrimaryFilter::RecoveryModel(model) => record.recovery_model == *model,
        }
    }
}

/// A validated selection request
#[derive(Debug, Clone, Default)]
pub struct FilterRequest {
    /// The one active selection criterion
    pub primary: PrimaryFilter,
    /// Names removed after the primary selection, whatever it was
    pub exclude: Vec<String>,
    /// How names are matched for selection and exclusion
    pub comparison: NameComparison,
}

impl FilterRequest {
    /// Creates a request with the given primary criterion and no exclusions.
    pub fn new(primary: PrimaryFilter) -> Self {
        Self {
            primary,
            ..Self::default()
        }
    }

    /// Sets the exclusion list.
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Sets the name comparison.
    pub fn with_comparison(mut self, comparison: NameComparison) -> Self {
        self.comparison = comparison;
        self
    }
}

/// Raw, possibly conflicting selection flags as supplied by a caller.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Select only system databases
    pub system_only: bool,
    /// Select only user databases
    pub user_only: bool,
    /// Select databases by name
    pub names: Vec<String>,
    /// Select databases in this status
    pub status: Option<DatabaseStatus>,
    /// Select databases owned by these logins
    pub owners: Vec<String>,
    /// Select databases with this access mode
    pub access: Option<AccessMode>,
    /// Select encrypted databases
    pub encrypted: bool,
    /// Select databases using this recovery model
    pub recovery_model: Option<RecoveryModel>,
    /// Names removed after selection
    pub exclude: Vec<String>,
}

impl FilterCriteria {
    /// Validates the flags and collapses them into a single-criterion request.
    ///
    /// # Errors
    /// Returns `ConflictingFilters` when system-only and user-only are both
    /// set, or when any two primary criteria are populated at once.
    pub fn into_request(self, comparison: NameComparison) -> Result<FilterRequest> {
        if self.system_only && self.user_only {
            return Err(InventoryError::ConflictingFilters {
                first: PrimaryFilter::SystemOnly.label(),
                second: PrimaryFilter::UserOnly.label(),
            });
        }

        let mut populated = Vec::new();
        if self.system_only {
            populated.push(PrimaryFilter::SystemOnly);
        }
        if self.user_only {
            populated.push(PrimaryFilter::UserOnly);
        }
        if !self.names.is_empty() {
            populated.push(PrimaryFilter::Names(self.names));
        }
        if let Some(status) = self.status {
            populated.push(PrimaryFilter::Status(status));
        }
        if !self.owners.is_empty() {
            populated.push(PrimaryFilter::Owners(self.owners));
        }
        if let Some(access) = self.access {
            populated.push(PrimaryFilter::Access(access));
        }
        if self.encrypted {
            populated.push(PrimaryFilter::Encrypted);
        }
        if let Some(model) = self.recovery_model {
            populated.push(PrimaryFilter::RecoveryModel(model));
        }

        let mut populated = populated.into_iter();
        let primary = populated.next().unwrap_or_default();
        if let Some(other) = populated.next() {
            return Err(InventoryError::ConflictingFilters {
                first: primary.label(),
                second: other.label(),
            });
        }

        Ok(FilterRequest {
            primary,
            exclude: self.exclude,
            comparison,
        })
    }
}

/// Selects the databases matching the request's primary criterion, then
/// drops every name on the exclusion list.
///
/// Input order is preserved and the input slice is never modified.
pub fn select(databases: &[DatabaseRecord], request: &FilterRequest) -> Vec<DatabaseRecord> {
    let comparison = request.comparison;

    let selected: Vec<DatabaseRecord> = databases
        .iter()
        .filter(|record| request.primary.matches(record, comparison))
        .cloned()
        .collect();

    tracing::debug!(
        "Filter '{}' kept {} of {} databases",
        request.primary.label(),
        selected.len(),
        databases.len()
    );

    if request.exclude.is_empty() {
        return selected;
    }

    let before = selected.len();
    let remaining: Vec<DatabaseRecord> = selected
        .into_iter()
        .filter(|record| {
            let excluded = comparison.contains(&request.exclude, &record.name);
            if excluded {
                tracing::trace!("Excluding database by name: {}", record.name);
            }
            !excluded
        })
        .collect();

    tracing::debug!(
        "Exclusion list removed {} databases",
        before.saturating_sub(remaining.len())
    );

    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(name: &str, is_system: bool) -> DatabaseRecord {
        let mut record = DatabaseRecord::new(name);
        record.is_system_object = is_system;
        record
    }

    fn instance_databases() -> Vec<DatabaseRecord> {
        vec![
            record("A", true),
            record("B", false),
            record("C", false),
            record("tempdb", true),
        ]
    }

    fn names(records: &[DatabaseRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_no_criterion_keeps_everything() {
        let databases = instance_databases();
        let selected = select(&databases, &FilterRequest::default());
        assert_eq!(selected, databases);
    }

    #[test]
    fn test_system_only() {
        let databases = vec![record("A", true), record("B", false), record("C", false)];
        let selected = select(&databases, &FilterRequest::new(PrimaryFilter::SystemOnly));
        assert_eq!(names(&selected), vec!["A"]);
    }

    #[test]
    fn test_user_only_with_exclusion() {
        let databases = instance_databases();
        let request =
            FilterRequest::new(PrimaryFilter::UserOnly).with_exclude(vec!["C".to_string()]);
        assert_eq!(names(&select(&databases, &request)), vec!["B"]);
    }

    #[test]
    fn test_name_list_respects_comparison() {
        let databases = vec![record("Sales", false), record("hr", false)];

        let insensitive = FilterRequest::new(PrimaryFilter::Names(vec!["sales".to_string()]));
        assert_eq!(names(&select(&databases, &insensitive)), vec!["Sales"]);

        let sensitive = insensitive
            .clone()
            .with_comparison(NameComparison::CaseSensitive);
        assert!(select(&databases, &sensitive).is_empty());

        let prefix = FilterRequest::new(PrimaryFilter::Names(vec!["h".to_string()]))
            .with_comparison(NameComparison::Custom(|wanted, name| name.starts_with(wanted)));
        assert_eq!(names(&select(&databases, &prefix)), vec!["hr"]);
    }

    #[test]
    fn test_status_owner_access_encryption_recovery() {
        let mut offline = record("offline_db", false);
        offline.status = DatabaseStatus::Offline;
        offline.owner = "sa".to_string();
        let mut archive = record("archive", false);
        archive.read_only = true;
        archive.encryption_enabled = true;
        archive.owner = "DOMAIN\\dba".to_string();
        let mut scratch = record("scratch", false);
        scratch.recovery_model = RecoveryModel::Simple;
        let databases = vec![offline, archive, scratch];

        let by = |primary| names(&select(&databases, &FilterRequest::new(primary)))
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        assert_eq!(by(PrimaryFilter::Status(DatabaseStatus::Offline)), vec!["offline_db"]);
        assert_eq!(by(PrimaryFilter::Owners(vec!["domain\\DBA".to_string()])), vec!["archive"]);
        assert_eq!(by(PrimaryFilter::Access(AccessMode::ReadOnly)), vec!["archive"]);
        assert_eq!(
            by(PrimaryFilter::Access(AccessMode::ReadWrite)),
            vec!["offline_db", "scratch"]
        );
        assert_eq!(by(PrimaryFilter::Encrypted), vec!["archive"]);
        assert_eq!(
            by(PrimaryFilter::RecoveryModel(RecoveryModel::Simple)),
            vec!["scratch"]
        );
    }

    #[test]
    fn test_select_does_not_mutate_input() {
        let databases = instance_databases();
        let snapshot = databases.clone();
        let _ = select(
            &databases,
            &FilterRequest::new(PrimaryFilter::SystemOnly).with_exclude(vec!["A".to_string()]),
        );
        assert_eq!(databases, snapshot);
    }

    #[test]
    fn test_system_and_user_only_conflict() {
        let criteria = FilterCriteria {
            system_only: true,
            user_only: true,
            ..FilterCriteria::default()
        };
        let err = criteria
            .into_request(NameComparison::default())
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::ConflictingFilters {
                first: "system-only",
                second: "user-only"
            }
        ));
    }

    #[test]
    fn test_any_two_primary_criteria_conflict() {
        let criteria = FilterCriteria {
            status: Some(DatabaseStatus::Normal),
            encrypted: true,
            ..FilterCriteria::default()
        };
        let err = criteria
            .into_request(NameComparison::default())
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::ConflictingFilters {
                first: "status",
                second: "encrypted"
            }
        ));
    }

    #[test]
    fn test_criteria_collapse_to_single_variant() {
        let request = FilterCriteria {
            owners: vec!["sa".to_string()],
            exclude: vec!["model".to_string()],
            ..FilterCriteria::default()
        }
        .into_request(NameComparison::CaseSensitive)
        .unwrap();

        assert_eq!(request.primary, PrimaryFilter::Owners(vec!["sa".to_string()]));
        assert_eq!(request.exclude, vec!["model".to_string()]);

        let empty = FilterCriteria::default()
            .into_request(NameComparison::default())
            .unwrap();
        assert_eq!(empty.primary, PrimaryFilter::All);
    }

    fn arb_record() -> impl Strategy<Value = DatabaseRecord> {
        (
            "[a-e]{1,3}",
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            prop::sample::select(DatabaseStatus::ALL.to_vec()),
            prop::sample::select(vec![
                RecoveryModel::Full,
                RecoveryModel::Simple,
                RecoveryModel::BulkLogged,
            ]),
            prop::sample::select(vec!["sa", "dba", "app"]),
        )
            .prop_map(|(name, system, read_only, encrypted, status, model, owner)| {
                let mut record = DatabaseRecord::new(name);
                record.is_system_object = system;
                record.read_only = read_only;
                record.encryption_enabled = encrypted;
                record.status = status;
                record.recovery_model = model;
                record.owner = owner.to_string();
                record
            })
    }

    fn arb_primary() -> impl Strategy<Value = PrimaryFilter> {
        prop_oneof![
            Just(PrimaryFilter::All),
            Just(PrimaryFilter::SystemOnly),
            Just(PrimaryFilter::UserOnly),
            prop::collection::vec("[a-e]{1,3}", 0..4).prop_map(PrimaryFilter::Names),
            prop::sample::select(DatabaseStatus::ALL.to_vec()).prop_map(PrimaryFilter::Status),
            Just(PrimaryFilter::Owners(vec!["dba".to_string()])),
            Just(PrimaryFilter::Access(AccessMode::ReadOnly)),
            Just(PrimaryFilter::Access(AccessMode::ReadWrite)),
            Just(PrimaryFilter::Encrypted),
            Just(PrimaryFilter::RecoveryModel(RecoveryModel::Simple)),
        ]
    }

    proptest! {
        #[test]
        fn test_exclusion_composes_with_every_primary(
            databases in prop::collection::vec(arb_record(), 0..12),
            primary in arb_primary(),
            exclude in prop::collection::vec("[a-e]{1,3}", 0..4),
        ) {
            let without = select(&databases, &FilterRequest::new(primary.clone()));
            let with = select(
                &databases,
                &FilterRequest::new(primary).with_exclude(exclude.clone()),
            );

            let expected: Vec<DatabaseRecord> = without
                .into_iter()
                .filter(|r| !NameComparison::default().contains(&exclude, &r.name))
                .collect();
            prop_assert_eq!(with, expected);
        }

        #[test]
        fn test_primary_selection_matches_predicate_exactly(
            databases in prop::collection::vec(arb_record(), 0..12),
            primary in arb_primary(),
        ) {
            let selected = select(&databases, &FilterRequest::new(primary.clone()));
            let expected: Vec<DatabaseRecord> = databases
                .iter()
                .filter(|r| primary.matches(r, NameComparison::default()))
                .cloned()
                .collect();
            prop_assert_eq!(selected, expected);
        }

        #[test]
        fn test_fallback_is_stable(databases in prop::collection::vec(arb_record(), 0..12)) {
            let first = select(&databases, &FilterRequest::default());
            let second = select(&databases, &FilterRequest::default());
            prop_assert_eq!(&first, &databases);
            prop_assert_eq!(first, second);
        }
    }
}
