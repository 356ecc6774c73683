//! Error types with instance attribution and credential sanitization.
//!
//! Every per-instance failure carries the display identity of the instance
//! it came from so a multi-instance batch can report it and move on. No
//! variant ever embeds a password or a raw connection string.

use thiserror::Error;

/// Boxed error source used by collaborator failures.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for dbinventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Two mutually exclusive primary filters were requested together
    #[error("Conflicting filters: {first} cannot be combined with {second}")]
    ConflictingFilters {
        first: &'static str,
        second: &'static str,
    },

    /// Could not connect to the instance (credentials sanitized)
    #[error("Connection to {instance} failed: {source}")]
    ConnectionFailed {
        instance: String,
        #[source]
        source: BoxedSource,
    },

    /// The backup history collaborator failed
    #[error("Backup history lookup on {instance} failed: {source}")]
    HistoryLookupFailed {
        instance: String,
        #[source]
        source: BoxedSource,
    },

    /// The database enumerator failed
    #[error("Database enumeration on {instance} failed: {source}")]
    Enumeration {
        instance: String,
        #[source]
        source: BoxedSource,
    },

    /// Query timeout or execution failure
    #[error("Query execution failed: {context}")]
    QueryExecution { context: String },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Instance address could not be parsed
    #[error("Invalid SQL Server instance: '{input}'")]
    InvalidInstance { input: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with InventoryError
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Coarse classification used when recording batch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Could not connect or log in
    ConnectionFailed,
    /// Backup history could not be read
    HistoryLookupFailed,
    /// Databases could not be listed
    Enumeration,
    /// Anything not tied to one of the above
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::ConnectionFailed => write!(f, "ConnectionFailed"),
            FailureKind::HistoryLookupFailed => write!(f, "HistoryLookupFailed"),
            FailureKind::Enumeration => write!(f, "EnumerationFailed"),
            FailureKind::Other => write!(f, "Other"),
        }
    }
}

/// Removes `user=`, `password=` and `pwd=` style key/value pairs from
/// driver messages before they are wrapped into an error.
///
/// # Example
///
/// ```rust
/// use dbinventory_core::error::redact_connection_details;
///
/// let cleaned = redact_connection_details("login failed; Password=hunter2;Server=db1");
/// assert!(!cleaned.contains("hunter2"));
/// assert!(cleaned.contains("Server=db1"));
/// ```
pub fn redact_connection_details(message: &str) -> String {
    const SENSITIVE_KEYS: &[&str] = &["password", "pwd", "user id", "uid", "user"];

    message
        .split(';')
        .map(|segment| {
            let Some((key, _)) = segment.split_once('=') else {
                return segment.to_string();
            };
            let normalized = key.trim().to_ascii_lowercase();
            if SENSITIVE_KEYS.contains(&normalized.as_str()) {
                format!("{}=****", key)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Plain message error used to carry sanitized driver messages as a source.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SanitizedError(pub String);

impl SanitizedError {
    /// Wraps any error, stripping credential-looking fragments from its text.
    pub fn from_error<E: std::fmt::Display>(error: E) -> Self {
        Self(redact_connection_details(&error.to_string()))
    }
}

impl InventoryError {
    /// Creates a connection error tagged with the instance identity
    pub fn connection_failed<E>(instance: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionFailed {
            instance: instance.into(),
            source: Box::new(error),
        }
    }

    /// Creates a history lookup error tagged with the instance identity
    pub fn history_lookup_failed<E>(instance: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::HistoryLookupFailed {
            instance: instance.into(),
            source: Box::new(error),
        }
    }

    /// Creates an enumeration error tagged with the instance identity
    pub fn enumeration_failed<E>(instance: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Enumeration {
            instance: instance.into(),
            source: Box::new(error),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a query execution error
    pub fn query_failed(context: impl Into<String>) -> Self {
        Self::QueryExecution {
            context: context.into(),
        }
    }

    /// Instance identity for per-instance errors.
    pub fn instance(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailed { instance, .. }
            | Self::HistoryLookupFailed { instance, .. }
            | Self::Enumeration { instance, .. } => Some(instance),
            _ => None,
        }
    }

    /// Whether this error only affects one instance of a batch.
    pub fn is_per_instance(&self) -> bool {
        self.instance().is_some()
    }

    /// Failure classification for batch reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ConnectionFailed { .. } => FailureKind::ConnectionFailed,
            Self::HistoryLookupFailed { .. } => FailureKind::HistoryLookupFailed,
            Self::Enumeration { .. } => FailureKind::Enumeration,
            _ => FailureKind::Other,
        }
    }
}
