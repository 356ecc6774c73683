//! Secure credential container with automatic memory zeroing.
//!
//! SQL authentication only: a login name and an optional password, both
//! cleared from memory when the container is dropped.

use zeroize::{Zeroize, Zeroizing};

/// Secure credential container that automatically zeros memory on drop.
///
/// # Example
///
/// ```rust
/// use dbinventory_core::security::Credentials;
///
/// let creds = Credentials::new("inventory_reader".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "inventory_reader");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Checks if password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Password for the driver handshake. Never log the result.
    pub(crate) fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &self.has_password().then_some("****"))
            .finish()
    }
}
