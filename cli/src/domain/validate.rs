//! Validation rules for node fields.
//!
//! All checks run before any lock or network activity, so a bad `add`
//! or `update` never touches disk.

use std::sync::OnceLock;

use flotilla_common::types::MAX_NODE_NAME_LEN;
use regex::Regex;

use crate::domain::error::ValidationError;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)] // compile-time constant pattern
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex")
    })
}

/// Validates a node display name: filesystem/CLI-safe character set,
/// at most 100 characters, leading character alphanumeric.
///
/// # Errors
///
/// Returns `ValidationError::InvalidName` when the name is empty, too
/// long, or contains characters outside `[A-Za-z0-9._-]`.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_NODE_NAME_LEN || !name_pattern().is_match(name) {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Validates a network address. A host starting with `-` could be
/// reinterpreted as an option flag by the SSH client, so it is rejected
/// here as well as in the transport.
///
/// # Errors
///
/// Returns `ValidationError::InvalidHost` for an empty host or one with
/// a leading `-`.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() || host.starts_with('-') {
        return Err(ValidationError::InvalidHost(host.to_string()));
    }
    Ok(())
}

/// Validates a port number. Ports arrive as `u32` from parsing layers so
/// that out-of-range values can be reported rather than silently wrapped.
///
/// # Errors
///
/// Returns `ValidationError::InvalidPort` when outside 1-65535.
pub fn validate_port(port: u32) -> Result<u16, ValidationError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(ValidationError::InvalidPort(port))
}

/// Validates a login account name.
///
/// # Errors
///
/// Returns `ValidationError::EmptyUser` for an empty string.
pub fn validate_user(user: &str) -> Result<(), ValidationError> {
    if user.trim().is_empty() {
        return Err(ValidationError::EmptyUser);
    }
    Ok(())
}
