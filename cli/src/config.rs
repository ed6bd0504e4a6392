//! Fleet directory resolution.
//!
//! All file paths derive from one `FleetPaths` value constructed at
//! process start and threaded into every component, so tests can inject
//! a temp directory instead of relying on `$HOME`.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Environment variable overriding the fleet data directory.
pub const FLEET_DIR_ENV: &str = "FLOTILLA_HOME";

/// Resolved locations of the fleet's on-disk state.
#[derive(Debug, Clone)]
pub struct FleetPaths {
    root: PathBuf,
}

impl FleetPaths {
    /// Resolve the fleet directory: `$FLOTILLA_HOME` if set, otherwise
    /// `~/.flotilla`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined and
    /// no override is set.
    pub fn from_env() -> Result<Self> {
        if let Ok(val) = std::env::var(FLEET_DIR_ENV) {
            if !val.is_empty() {
                return Ok(Self::with_root(PathBuf::from(val)));
            }
        }
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_root(home.join(".flotilla")))
    }

    /// Create paths rooted at an arbitrary directory (used in tests).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The inventory file holding all node records.
    #[must_use]
    pub fn inventory_file(&self) -> PathBuf {
        self.root.join("inventory.json")
    }

    /// Advisory lock file guarding inventory mutations.
    #[must_use]
    pub fn inventory_lock_file(&self) -> PathBuf {
        self.root.join("inventory.json.lock")
    }

    /// Host-identity database, scoped to this tool — never the system's
    /// shared `known_hosts`.
    #[must_use]
    pub fn known_hosts_file(&self) -> PathBuf {
        self.root.join("known_hosts")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_paths_derive_from_root() {
        let paths = FleetPaths::with_root(PathBuf::from("/tmp/fleet"));
        assert_eq!(paths.inventory_file(), PathBuf::from("/tmp/fleet/inventory.json"));
        assert_eq!(
            paths.inventory_lock_file(),
            PathBuf::from("/tmp/fleet/inventory.json.lock")
        );
        assert_eq!(paths.known_hosts_file(), PathBuf::from("/tmp/fleet/known_hosts"));
    }

    #[test]
    #[serial]
    fn test_from_env_honors_override() {
        std::env::set_var(FLEET_DIR_ENV, "/tmp/elsewhere");
        let paths = FleetPaths::from_env().expect("resolve");
        assert_eq!(paths.root(), Path::new("/tmp/elsewhere"));
        std::env::remove_var(FLEET_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_to_dot_flotilla() {
        std::env::remove_var(FLEET_DIR_ENV);
        let paths = FleetPaths::from_env().expect("resolve");
        assert!(paths.root().ends_with(".flotilla"));
    }
}
