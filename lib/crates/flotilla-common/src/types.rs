//! Core data model: node records, the inventory file, preflight facts
//! and diagnostic health records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every inventory file. Readers treat a
/// mismatched version as an empty inventory; writers always re-establish
/// the current version.
pub const INVENTORY_SCHEMA_VERSION: u32 = 1;

/// Maximum length of a node name.
pub const MAX_NODE_NAME_LEN: usize = 100;

// ── OS / architecture / service vocabulary ───────────────────────────────────

/// Operating-system family of a remote node.
///
/// Only two Unix-like families are supported for provisioning; anything
/// else parses as `Unknown` rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Darwin,
    Unknown,
}

impl OsFamily {
    /// Parse a `uname -s` style string, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Self::Linux,
            "darwin" | "macos" => Self::Darwin,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture of a remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuArch {
    X86_64,
    Aarch64,
    Unknown,
}

impl CpuArch {
    /// Parse a `uname -m` style string, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Self::X86_64,
            "aarch64" | "arm64" => Self::Aarch64,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CpuArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known state of the managed agent service on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    Unknown,
}

impl ServiceState {
    /// Parse a service-manager state string, case-insensitively.
    /// Anything outside the vocabulary becomes `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" | "active" => Self::Running,
            "stopped" | "inactive" | "failed" | "dead" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Node record ──────────────────────────────────────────────────────────────

/// Record of an agent installation on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
    /// Agent version string as installed.
    pub version: String,
    /// When the bootstrap that installed it completed.
    pub installed_at: DateTime<Utc>,
}

/// One managed remote machine.
///
/// Owned exclusively by the inventory store; every other component works
/// on clones or submits partial updates keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable generated identifier, immutable for the record's lifetime.
    pub id: String,
    /// Display name, unique case-insensitively across the fleet.
    pub name: String,
    /// Network address (hostname or IP).
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login account name on the remote machine.
    pub user: String,
    /// Whether the operator has explicitly accepted this node's host identity.
    #[serde(default)]
    pub trusted: bool,
    /// Snapshot of the pinned host key, `"<algorithm> <key>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,
    /// Free-form operator tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<CpuArch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallInfo>,
    /// Last successful remote contact of any kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_state: Option<ServiceState>,
}

/// Partial update applied field-by-field against a stored node record.
///
/// `None` means "leave unchanged" — there is no way to clear a field back
/// to absent through an update, which matches how the executor and the
/// diagnostics path use it (they only ever add fresher information).
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub trusted: Option<bool>,
    pub host_key_fingerprint: Option<String>,
    pub tags: Option<Vec<String>>,
    pub os: Option<OsFamily>,
    pub arch: Option<CpuArch>,
    pub install: Option<InstallInfo>,
    pub last_contact: Option<DateTime<Utc>>,
    pub service_state: Option<ServiceState>,
}

// ── Inventory file ───────────────────────────────────────────────────────────

/// The persisted fleet inventory: a schema-versioned ordered list of nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub schema_version: u32,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            schema_version: INVENTORY_SCHEMA_VERSION,
            nodes: Vec::new(),
        }
    }
}

// ── Preflight fact sheet ─────────────────────────────────────────────────────

/// Facts gathered by the read-only preflight probe of one node.
///
/// Ephemeral — produced fresh per bootstrap attempt, never persisted as a
/// whole. Only derived fields flow back into the node record on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSheet {
    pub os: OsFamily,
    pub arch: CpuArch,
    /// Remote home directory, absolute. Preflight rejects an empty value.
    pub home_dir: String,
    pub has_node: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    pub has_npm: bool,
    /// `Some(version)` when the product agent is installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    /// Whether the service manager knows about the agent service.
    pub service_registered: bool,
    /// Whether the service is currently active.
    pub service_active: bool,
}

// ── Diagnostics health record ────────────────────────────────────────────────

/// Result of a single diagnostic probe of one node. Every failure mode is
/// represented in the record — probing never raises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthRecord {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub service_running: bool,
    pub service_status: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthRecord {
    /// An offline record carrying only an error message.
    #[must_use]
    pub fn offline(error: impl Into<String>) -> Self {
        Self {
            online: false,
            version: None,
            service_running: false,
            service_status: ServiceState::Unknown,
            uptime: None,
            error: Some(error.into()),
        }
    }
}
