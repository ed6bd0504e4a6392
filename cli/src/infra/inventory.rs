//! Durable node inventory with crash-safe persistence.
//!
//! Reads are lock-free point-in-time snapshots. Every mutation acquires
//! the advisory file lock, re-reads the file under the lock, applies the
//! change in memory and publishes it with an atomic rename, so two
//! concurrent flotilla processes never lose each other's writes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use flotilla_common::types::{
    INVENTORY_SCHEMA_VERSION, Inventory, Node, NodeUpdate,
};

use crate::config::FleetPaths;
use crate::domain::error::InventoryError;
use crate::domain::validate;
use crate::infra::lock::{self, LockOptions};

/// Request to register a new node.
#[derive(Debug, Clone)]
pub struct AddNode {
    pub name: String,
    pub host: String,
    pub port: u32,
    pub user: String,
    pub tags: Vec<String>,
}

/// File-backed inventory store.
pub struct InventoryStore {
    file: PathBuf,
    lock_file: PathBuf,
    lock_opts: LockOptions,
}

impl InventoryStore {
    #[must_use]
    pub fn new(paths: &FleetPaths) -> Self {
        Self::with_paths(paths.inventory_file(), paths.inventory_lock_file())
    }

    /// Create a store over explicit paths (used in tests).
    #[must_use]
    pub fn with_paths(file: PathBuf, lock_file: PathBuf) -> Self {
        Self {
            file,
            lock_file,
            lock_opts: LockOptions::default(),
        }
    }

    // ── reads (lock-free snapshots) ──────────────────────────────────────────

    /// Load the inventory. A missing, corrupt, or schema-mismatched file
    /// reads as an empty inventory — the CLI stays available and the next
    /// writer re-establishes a valid file.
    #[must_use]
    pub fn load(&self) -> Inventory {
        let Ok(content) = std::fs::read_to_string(&self.file) else {
            return Inventory::default();
        };
        match serde_json::from_str::<Inventory>(&content) {
            Ok(inv) if inv.schema_version == INVENTORY_SCHEMA_VERSION => inv,
            _ => Inventory::default(),
        }
    }

    /// All registered nodes, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Node> {
        self.load().nodes
    }

    /// Look up a node by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Node> {
        self.load()
            .nodes
            .into_iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }

    // ── mutations (locked read-modify-write) ─────────────────────────────────

    /// Register a new node. Validation runs before any lock or disk
    /// activity; the duplicate check runs under the lock against the
    /// freshest on-disk state.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError` for invalid fields or a duplicate name,
    /// `LockError` when the inventory stays busy past the retry budget,
    /// or an I/O error if the write fails.
    pub fn add(&self, req: &AddNode) -> Result<Node> {
        validate::validate_name(&req.name).map_err(InventoryError::Validation)?;
        validate::validate_host(&req.host).map_err(InventoryError::Validation)?;
        let port = validate::validate_port(req.port).map_err(InventoryError::Validation)?;
        validate::validate_user(&req.user).map_err(InventoryError::Validation)?;

        let node = Node {
            id: generate_node_id(),
            name: req.name.clone(),
            host: req.host.clone(),
            port,
            user: req.user.clone(),
            trusted: false,
            host_key_fingerprint: None,
            tags: req.tags.clone(),
            os: None,
            arch: None,
            install: None,
            last_contact: None,
            service_state: None,
        };

        let added = node.clone();
        self.mutate(move |inv| {
            if inv
                .nodes
                .iter()
                .any(|n| n.name.eq_ignore_ascii_case(&node.name))
            {
                return Err(InventoryError::DuplicateName(node.name.clone()).into());
            }
            inv.nodes.push(node.clone());
            Ok(())
        })?;
        Ok(added)
    }

    /// Remove a node by name. Returns whether a record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error on lock exhaustion or write failure.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut removed = false;
        self.mutate(|inv| {
            let before = inv.nodes.len();
            inv.nodes.retain(|n| !n.name.eq_ignore_ascii_case(name));
            removed = inv.nodes.len() != before;
            Ok(())
        })?;
        Ok(removed)
    }

    /// Apply a partial update to the node named `name`, field by field.
    /// Returns the updated record, or `None` when no such node exists.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Validation` for invalid replacement
    /// fields, or an error on lock exhaustion or write failure.
    pub fn update(&self, name: &str, update: &NodeUpdate) -> Result<Option<Node>> {
        if let Some(host) = &update.host {
            validate::validate_host(host).map_err(InventoryError::Validation)?;
        }
        if let Some(user) = &update.user {
            validate::validate_user(user).map_err(InventoryError::Validation)?;
        }

        let mut updated = None;
        self.mutate(|inv| {
            let Some(node) = inv
                .nodes
                .iter_mut()
                .find(|n| n.name.eq_ignore_ascii_case(name))
            else {
                return Ok(());
            };
            apply_update(node, update);
            updated = Some(node.clone());
            Ok(())
        })?;
        Ok(updated)
    }

    /// Locked read-modify-write cycle. The lock guard is dropped (and the
    /// lock file removed) even when the mutation closure fails.
    fn mutate(&self, f: impl FnOnce(&mut Inventory) -> Result<()>) -> Result<()> {
        let _guard = lock::acquire(&self.lock_file, &self.lock_opts)?;
        let mut inv = self.load();
        f(&mut inv)?;
        inv.schema_version = INVENTORY_SCHEMA_VERSION;
        let content =
            serde_json::to_string_pretty(&inv).context("serializing inventory")?;
        crate::infra::fs::write_atomic(&self.file, &content)
    }
}

fn apply_update(node: &mut Node, update: &NodeUpdate) {
    if let Some(host) = &update.host {
        node.host = host.clone();
    }
    if let Some(port) = update.port {
        node.port = port;
    }
    if let Some(user) = &update.user {
        node.user = user.clone();
    }
    if let Some(trusted) = update.trusted {
        node.trusted = trusted;
    }
    if let Some(fp) = &update.host_key_fingerprint {
        node.host_key_fingerprint = Some(fp.clone());
    }
    if let Some(tags) = &update.tags {
        node.tags = tags.clone();
    }
    if let Some(os) = update.os {
        node.os = Some(os);
    }
    if let Some(arch) = update.arch {
        node.arch = Some(arch);
    }
    if let Some(install) = &update.install {
        node.install = Some(install.clone());
    }
    if let Some(ts) = update.last_contact {
        node.last_contact = Some(ts);
    }
    if let Some(state) = update.service_state {
        node.service_state = Some(state);
    }
}

/// Generate a node ID with 64 bits of entropy.
///
/// Uses `RandomState` (`SipHash` with random keys) seeded with a
/// nanosecond timestamp, producing a 16-character hex suffix.
fn generate_node_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    format!("node-{:016x}", hasher.finish())
}
