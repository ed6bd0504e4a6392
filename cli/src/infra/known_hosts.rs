//! Host-identity trust store (`known_hosts`-style pinning).
//!
//! One entry per line, `ADDRESS ALGORITHM KEY`, where `ADDRESS` is a
//! bare host for the default port or `[host]:port` otherwise. The file
//! is shared with the SSH client via `UserKnownHostsFile`, so the format
//! must round-trip losslessly.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::FleetPaths;
use crate::infra::fs;

/// Default SSH port; addresses on it serialize in bare-host form.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Modern algorithm preferred when several keys are pinned for one address.
const PREFERRED_ALGORITHM: &str = "ssh-ed25519";
/// Legacy fallback algorithm.
const LEGACY_ALGORITHM: &str = "ssh-rsa";

/// One pinned host key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyEntry {
    pub host: String,
    pub port: u16,
    pub algorithm: String,
    pub key: String,
}

impl HostKeyEntry {
    /// `"<algorithm> <key>"` — the fingerprint snapshot stored on nodes.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!("{} {}", self.algorithm, self.key)
    }
}

// ── line format ──────────────────────────────────────────────────────────────

fn format_address(host: &str, port: u16) -> String {
    if port == DEFAULT_SSH_PORT {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

fn parse_address(address: &str) -> (String, u16) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once("]:") {
            if let Ok(port) = port.parse::<u16>() {
                return (host.to_string(), port);
            }
        }
    }
    (address.to_string(), DEFAULT_SSH_PORT)
}

/// Parse `known_hosts` text into entries. Blank lines, `#` comments and
/// malformed lines are skipped.
#[must_use]
pub fn parse_host_entries(content: &str) -> Vec<HostKeyEntry> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let mut parts = line.split_whitespace();
            let address = parts.next()?;
            let algorithm = parts.next()?;
            let key = parts.next()?;
            let (host, port) = parse_address(address);
            Some(HostKeyEntry {
                host,
                port,
                algorithm: algorithm.to_string(),
                key: key.to_string(),
            })
        })
        .collect()
}

/// Serialize entries into canonical `known_hosts` text. The output of
/// `format_host_entries(parse_host_entries(s))` is stable for any valid
/// input.
#[must_use]
pub fn format_host_entries(entries: &[HostKeyEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format_address(&entry.host, entry.port));
        out.push(' ');
        out.push_str(&entry.algorithm);
        out.push(' ');
        out.push_str(&entry.key);
        out.push('\n');
    }
    out
}

/// Parse `ssh-keyscan` output for one scanned address, normalizing every
/// entry to the queried `(host, port)` regardless of how the scanner
/// printed the address.
#[must_use]
pub fn parse_keyscan_output(host: &str, port: u16, output: &str) -> Vec<HostKeyEntry> {
    parse_host_entries(output)
        .into_iter()
        .map(|mut entry| {
            entry.host = host.to_string();
            entry.port = port;
            entry
        })
        .collect()
}

// ── store ────────────────────────────────────────────────────────────────────

/// File-backed trust store over the fleet's `known_hosts`.
///
/// Unlike the inventory, mutations here take no inter-process lock:
/// trust decisions are rare single-operator events, not contended
/// writers. The atomic-rename publish step still applies.
pub struct KnownHostsStore {
    path: PathBuf,
}

impl KnownHostsStore {
    #[must_use]
    pub fn new(paths: &FleetPaths) -> Self {
        Self::with_path(paths.known_hosts_file())
    }

    /// Create a store at an arbitrary path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// On-disk location, handed to SSH as `UserKnownHostsFile`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All pinned entries. A missing or unreadable file reads as empty.
    #[must_use]
    pub fn load(&self) -> Vec<HostKeyEntry> {
        std::fs::read_to_string(&self.path)
            .map(|content| parse_host_entries(&content))
            .unwrap_or_default()
    }

    /// The single pinned entry surfaced for a verification decision:
    /// the modern algorithm if pinned, then the legacy one, then the
    /// first recorded entry for the address.
    #[must_use]
    pub fn get(&self, host: &str, port: u16) -> Option<HostKeyEntry> {
        let entries: Vec<_> = self
            .load()
            .into_iter()
            .filter(|e| e.host == host && e.port == port)
            .collect();
        for algorithm in [PREFERRED_ALGORITHM, LEGACY_ALGORITHM] {
            if let Some(entry) = entries.iter().find(|e| e.algorithm == algorithm) {
                return Some(entry.clone());
            }
        }
        entries.into_iter().next()
    }

    /// Pin a key, replacing only the entry with the same exact
    /// (host, port, algorithm); pins for other algorithms at the same
    /// address survive a single-algorithm rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn pin(&self, entry: &HostKeyEntry) -> Result<()> {
        let mut entries = self.load();
        if let Some(existing) = entries.iter_mut().find(|e| {
            e.host == entry.host && e.port == entry.port && e.algorithm == entry.algorithm
        }) {
            existing.key = entry.key.clone();
        } else {
            entries.push(entry.clone());
        }
        self.save(&entries)
    }

    /// Remove every pinned entry for an address. Returns whether any
    /// entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn remove(&self, host: &str, port: u16) -> Result<bool> {
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|e| !(e.host == host && e.port == port));
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    /// Compare a freshly discovered key against the pin for the same
    /// (host, port, algorithm). `None` means no prior entry exists.
    #[must_use]
    pub fn has_changed(&self, candidate: &HostKeyEntry) -> Option<bool> {
        self.load()
            .into_iter()
            .find(|e| {
                e.host == candidate.host
                    && e.port == candidate.port
                    && e.algorithm == candidate.algorithm
            })
            .map(|pinned| pinned.key != candidate.key)
    }

    fn save(&self, entries: &[HostKeyEntry]) -> Result<()> {
        fs::write_atomic(&self.path, &format_host_entries(entries))
    }
}
