//! Security utilities for credential protection.
//!
//! # Security Guarantees
//! - Credentials are stored in `Zeroizing` containers for automatic memory clearing
//! - Passwords never appear in `Debug` output, logs or error messages

mod credentials;

pub use credentials::Credentials;
