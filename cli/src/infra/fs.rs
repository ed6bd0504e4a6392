//! Filesystem helpers shared by the inventory and trust stores.
//!
//! Both stores publish new file contents the same way: write to a
//! temporary file in the target directory, set owner-only permissions,
//! then rename over the destination. The rename is the only publish
//! step, so a crash mid-write never leaves a partially-written file
//! visible.

use std::path::Path;

use anyhow::{Context, Result};

/// Create `dir` (and parents) with mode 700 on Unix.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or its
/// permissions cannot be set.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    set_permissions(dir, 0o700)
}

/// Atomically replace `path` with `content`, mode 600.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be prepared, the
/// temporary file cannot be written, or the rename fails.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", path.display()))?;
    ensure_private_dir(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    std::io::Write::write_all(&mut tmp.as_file(), content.as_bytes())
        .with_context(|| format!("write temp file for {}", path.display()))?;
    set_permissions(tmp.path(), 0o600)?;
    tmp.persist(path)
        .with_context(|| format!("rename temp file over {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
