//! Secret handling utilities.
//!
//! Re-exports the secrecy types callers need to reach the database URL.

pub use secrecy::{ExposeSecret, SecretString};
