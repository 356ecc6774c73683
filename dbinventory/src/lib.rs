//! Library module for dbinventory
//!
//! Holds the CLI definition, the translation of flags into core requests,
//! credential sourcing and output rendering. The binary in `main.rs` only
//! wires these together.

pub mod output;

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use dbinventory_core::security::Credentials;
use dbinventory_core::{
    AccessMode, BatchConfig, ConnectionConfig, DatabaseStatus, FilterCriteria, InventoryCriteria,
    NameComparison, RecoveryModel, SqlInstance, StalenessPolicy, StalenessRule,
};
use std::path::PathBuf;
use std::time::Duration;

pub use output::OutputFormat;

/// Environment variable holding the SQL login password.
pub const PASSWORD_ENV: &str = "DBINVENTORY_PASSWORD";

/// Exit code when every instance was inventoried
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for fatal errors (invalid flags, conflicting filters)
pub const EXIT_FATAL: u8 = 1;
/// Exit code when the batch finished but some instances failed
pub const EXIT_PARTIAL: u8 = 2;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dbinventory")]
#[command(about = "SQL Server database inventory and backup staleness report")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "
dbinventory - SQL Server database inventory

Connects to one or more SQL Server instances, lists their databases and
reports the ones matching a single filter. Backup staleness checks narrow
the report to databases without a recent full or log backup; copy-only
backups never count.

SECURITY FEATURES:
- Read-only catalog queries only
- Password read from DBINVENTORY_PASSWORD or an interactive prompt
- Credentials never logged

EXAMPLES:
  dbinventory -S \"sql01;sql02\\PROD,1500\" --user audit --exclude-system
  dbinventory -S sql01 --user audit --no-full-backup-since 2024-01-01
  dbinventory -S sql01 --user audit --format json --output inventory.json
  dbinventory -S sql01 --user audit test
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub staleness: StalenessArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check connectivity to each instance without reporting
    Test,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Target instances and login settings
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Instances to inventory
    #[arg(
        short = 'S',
        long = "sql-instance",
        env = "DBINVENTORY_INSTANCES",
        value_delimiter = ';',
        global = true,
        help = "Instances separated by ';' or repeated (host, host\\INSTANCE, host,port)"
    )]
    pub sql_instances: Vec<SqlInstance>,

    /// SQL login name
    #[arg(short, long, env = "DBINVENTORY_USER", global = true, help = "SQL login name")]
    pub user: Option<String>,

    /// Never prompt for a password
    #[arg(
        long,
        global = true,
        help = "Fail instead of prompting when DBINVENTORY_PASSWORD is not set"
    )]
    pub no_password_prompt: bool,

    #[arg(
        long,
        default_value = "1433",
        global = true,
        help = "Port for instances given without one"
    )]
    pub port: u16,

    #[arg(
        long,
        default_value = "15",
        value_name = "SECONDS",
        global = true,
        help = "Connection timeout in seconds"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        default_value = "60",
        value_name = "SECONDS",
        global = true,
        help = "Query timeout in seconds"
    )]
    pub query_timeout: u64,

    #[arg(long, global = true, help = "Accept self-signed server certificates")]
    pub trust_server_certificate: bool,

    #[arg(long, default_value = "1", help = "Number of instances inventoried at once")]
    pub max_concurrency: usize,
}

/// Database selection; at most one primary filter may be given
#[derive(Debug, Args)]
pub struct FilterArgs {
    #[arg(long, value_delimiter = ',', help = "Only these databases")]
    pub database: Vec<String>,

    #[arg(long, value_delimiter = ',', help = "Remove these databases from any selection")]
    pub exclude_database: Vec<String>,

    #[arg(long, help = "Exclude user databases (system databases only)")]
    pub exclude_user: bool,

    #[arg(long, help = "Exclude system databases (user databases only)")]
    pub exclude_system: bool,

    #[arg(long, help = "Only databases in this status (Normal, Offline, Recovering, ...)")]
    pub status: Option<DatabaseStatus>,

    #[arg(long, value_delimiter = ',', help = "Only databases owned by these logins")]
    pub owner: Vec<String>,

    #[arg(long, help = "Only ReadOnly or ReadWrite databases")]
    pub access: Option<AccessMode>,

    #[arg(long, help = "Only databases with encryption enabled")]
    pub encrypted: bool,

    #[arg(long, help = "Only databases in this recovery model (Full, Simple, BulkLogged)")]
    pub recovery_model: Option<RecoveryModel>,

    #[arg(long, help = "Compare database and owner names case-sensitively")]
    pub case_sensitive: bool,
}

/// Backup staleness checks
#[derive(Debug, Args)]
pub struct StalenessArgs {
    #[arg(long, help = "Only databases without any full backup")]
    pub no_full_backup: bool,

    #[arg(
        long,
        value_name = "DATE",
        value_parser = parse_since,
        help = "Only databases without a full backup since DATE (YYYY-MM-DD or RFC 3339)"
    )]
    pub no_full_backup_since: Option<DateTime<Utc>>,

    #[arg(long, help = "Only databases without any log backup")]
    pub no_log_backup: bool,

    #[arg(
        long,
        value_name = "DATE",
        value_parser = parse_since,
        help = "Only databases without a log backup since DATE (YYYY-MM-DD or RFC 3339)"
    )]
    pub no_log_backup_since: Option<DateTime<Utc>>,
}

/// Report rendering
#[derive(Debug, Args)]
pub struct OutputArgs {
    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Report format on stdout"
    )]
    pub format: OutputFormat,

    #[arg(short, long, value_name = "FILE", help = "Write the JSON report to FILE")]
    pub output: Option<PathBuf>,

    #[arg(long, requires = "output", help = "Compress the report file using Zstandard")]
    pub compress: bool,
}

/// Parses a staleness threshold: RFC 3339, or a date meaning midnight UTC.
///
/// # Errors
/// Returns a message naming both accepted forms.
pub fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date '{}' (expected YYYY-MM-DD or RFC 3339)", value))
}

impl FilterArgs {
    /// Raw filter flags, not yet checked for conflicts.
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            system_only: self.exclude_user,
            user_only: self.exclude_system,
            names: self.database.clone(),
            status: self.status,
            owners: self.owner.clone(),
            access: self.access,
            encrypted: self.encrypted,
            recovery_model: self.recovery_model,
            exclude: self.exclude_database.clone(),
        }
    }

    /// Name comparison selected on the command line.
    pub fn comparison(&self) -> NameComparison {
        if self.case_sensitive {
            NameComparison::CaseSensitive
        } else {
            NameComparison::CaseInsensitive
        }
    }
}

impl StalenessArgs {
    /// Staleness policy; a `--*-since` date implies the matching check.
    pub fn policy(&self) -> StalenessPolicy {
        StalenessPolicy {
            full: rule(self.no_full_backup, self.no_full_backup_since),
            log: rule(self.no_log_backup, self.no_log_backup_since),
        }
    }
}

fn rule(enabled: bool, since: Option<DateTime<Utc>>) -> Option<StalenessRule> {
    match (enabled, since) {
        (_, Some(since)) => Some(StalenessRule::NoBackupSince(since)),
        (true, None) => Some(StalenessRule::NoBackup),
        (false, None) => None,
    }
}

impl ConnectionArgs {
    /// Transport settings for the SQL Server provider.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new()
            .with_default_port(self.port)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_query_timeout(Duration::from_secs(self.query_timeout))
            .with_trust_server_certificate(self.trust_server_certificate)
    }

    /// Batch settings.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::new().with_max_concurrency(self.max_concurrency)
    }

    /// Target instances, required for every command.
    ///
    /// # Errors
    /// Fails when no instance was given.
    pub fn instances(&self) -> anyhow::Result<&[SqlInstance]> {
        if self.sql_instances.is_empty() {
            bail!("At least one instance is required (--sql-instance or DBINVENTORY_INSTANCES)");
        }
        Ok(&self.sql_instances)
    }

    /// Resolves the login: user from the flag or environment, password from
    /// `DBINVENTORY_PASSWORD`, otherwise an interactive prompt.
    ///
    /// # Security
    /// The password is never accepted as a flag, so it stays out of shell
    /// history and process listings.
    ///
    /// # Errors
    /// Fails when no user is given or the prompt cannot be read.
    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        resolve_credentials(self.user.as_deref(), !self.no_password_prompt)
    }
}

impl Cli {
    /// Unvalidated inventory inputs assembled from the flags.
    pub fn inventory_criteria(&self) -> InventoryCriteria {
        InventoryCriteria {
            filter: self.filter.criteria(),
            staleness: self.staleness.policy(),
            comparison: self.filter.comparison(),
        }
    }
}

/// Builds credentials from a user name and the password sources.
///
/// # Errors
/// Fails when `user` is missing or empty, or when prompting fails.
pub fn resolve_credentials(user: Option<&str>, allow_prompt: bool) -> anyhow::Result<Credentials> {
    let Some(user) = user.map(str::trim).filter(|u| !u.is_empty()) else {
        bail!("A SQL login is required (--user or DBINVENTORY_USER)");
    };

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Some(password),
        _ if allow_prompt => Some(
            rpassword::prompt_password(format!("Password for {}: ", user))
                .context("Failed to read password")?,
        ),
        _ => None,
    };

    Ok(Credentials::new(user.to_string(), password))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["dbinventory"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_since_accepts_date_and_rfc3339() {
        assert_eq!(
            parse_since("2023-01-01").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_since("2023-01-01T12:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 30, 0).unwrap()
        );
        assert!(parse_since("01/02/2023").unwrap_err().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_exclude_flags_map_to_primary_filters() {
        let cli = parse(&["-S", "sql01", "--exclude-system"]);
        let criteria = cli.filter.criteria();
        assert!(criteria.user_only);
        assert!(!criteria.system_only);

        let cli = parse(&["-S", "sql01", "--exclude-user"]);
        assert!(cli.filter.criteria().system_only);
    }

    #[test]
    fn test_since_implies_staleness_rule() {
        let cli = parse(&[
            "-S",
            "sql01",
            "--no-full-backup-since",
            "2024-01-01",
            "--no-log-backup",
        ]);
        let policy = cli.staleness.policy();
        assert_eq!(
            policy.full,
            Some(StalenessRule::NoBackupSince(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            ))
        );
        assert_eq!(policy.log, Some(StalenessRule::NoBackup));
    }

    #[test]
    fn test_instances_and_connection_config() {
        let cli = parse(&[
            "-S",
            "sql01;sql02\\PROD,1500",
            "--port",
            "1500",
            "--connect-timeout",
            "5",
            "--max-concurrency",
            "4",
        ]);
        let instances = cli.connection.instances().unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].instance_name(), "PROD");
        assert_eq!(instances[1].port(), Some(1500));

        let config = cli.connection.connection_config();
        assert_eq!(config.default_port, 1500);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(cli.connection.batch_config().max_concurrency, 4);
    }

    #[test]
    fn test_invalid_instance_rejected_by_parser() {
        assert!(Cli::try_parse_from(["dbinventory", "-S", "sql01,0"]).is_err());
    }

    #[test]
    fn test_test_subcommand_parses() {
        let cli = parse(&["-S", "sql01", "test"]);
        assert!(matches!(cli.command, Some(Command::Test)));
    }
}
