//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra` or `crate::commands`.
//! All error types implement `thiserror::Error` and convert to
//! `anyhow::Error` via the `?` operator.

use thiserror::Error;

// ── Validation errors ─────────────────────────────────────────────────────────

/// Rejections raised before any I/O when registering or updating a node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "Invalid node name '{0}': must be 1-100 characters of [A-Za-z0-9._-] starting with an alphanumeric"
    )]
    InvalidName(String),

    #[error("Invalid host '{0}': must be non-empty and must not start with '-'")]
    InvalidHost(String),

    #[error("Invalid port {0}: must be in 1-65535")]
    InvalidPort(u32),

    #[error("Login user must not be empty")]
    EmptyUser,
}

// ── Inventory errors ──────────────────────────────────────────────────────────

/// Errors surfaced by inventory mutations.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Node '{0}' already exists (names are case-insensitive)")]
    DuplicateName(String),
}

// ── Lock errors ───────────────────────────────────────────────────────────────

/// Advisory-lock acquisition failure, surfaced only after the retry
/// budget is exhausted.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Inventory is locked by another flotilla process (gave up after {attempts} attempts)")]
    Busy { attempts: u32 },

    #[error("Cannot create lock file: {0}")]
    Io(#[from] std::io::Error),
}

// ── Trust errors ──────────────────────────────────────────────────────────────

/// Host-identity violations. Always fatal; never auto-resolved.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error(
        "Host key for {host}:{port} has CHANGED since it was pinned.\n\
         This may indicate a man-in-the-middle attack.\n\
         If the key rotation is expected, re-run with --trust-new-key."
    )]
    HostKeyChanged { host: String, port: u16 },

    #[error("Host key discovery for {host}:{port} failed: {reason}")]
    DiscoveryFailed {
        host: String,
        port: u16,
        reason: String,
    },
}

// ── Plan errors ───────────────────────────────────────────────────────────────

/// Errors raised while building a provisioning plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Unsupported remote OS '{0}': only linux and darwin nodes can be bootstrapped")]
    UnsupportedOs(String),

    #[error("Invalid agent version '{0}': expected 'latest' or characters from [0-9A-Za-z._+-]")]
    InvalidVersion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages_name_the_field() {
        assert!(
            ValidationError::InvalidName("bad!".into())
                .to_string()
                .contains("bad!")
        );
        assert!(
            ValidationError::InvalidHost("-evil".into())
                .to_string()
                .contains("-evil")
        );
        assert!(ValidationError::InvalidPort(0).to_string().contains('0'));
    }

    #[test]
    fn test_trust_error_mentions_override_flag() {
        let err = TrustError::HostKeyChanged {
            host: "10.0.0.5".into(),
            port: 22,
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.5:22"));
        assert!(msg.contains("--trust-new-key"));
    }

    #[test]
    fn test_plan_error_names_the_os() {
        let err = PlanError::UnsupportedOs("unknown".into());
        assert!(err.to_string().contains("unknown"));
    }
}
