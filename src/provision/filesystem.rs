use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Filesystem primitives the orchestrator relies on. Every operation is idempotent.
pub trait Filesystem: Send + Sync {
    fn directory_exists(&self, path: &Path) -> bool;

    fn ensure_directory(&self, path: &Path) -> Result<()>;

    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    fn set_ownership(&self, path: &Path, user: &str, group: &str) -> Result<()>;

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    /// Remove a directory tree; a missing directory is not an error.
    fn remove_directory(&self, path: &Path) -> Result<()>;
}

/// The host filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFilesystem {
    manage_ownership: bool,
}

impl LocalFilesystem {
    pub fn new(manage_ownership: bool) -> Self {
        Self { manage_ownership }
    }
}

impl Filesystem for LocalFilesystem {
    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn ensure_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn set_ownership(&self, path: &Path, user: &str, group: &str) -> Result<()> {
        if !self.manage_ownership {
            return Ok(());
        }
        chown(path, user, group)
            .with_context(|| format!("Failed to chown {} to {}:{}", path.display(), user, group))
    }

    #[cfg(unix)]
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set mode {:o} on {}", mode, path.display()))
    }

    #[cfg(not(unix))]
    fn set_mode(&self, _path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

#[cfg(unix)]
fn chown(path: &Path, user: &str, group: &str) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let uid = lookup_uid(user)?;
    let gid = lookup_gid(group)?;
    let meta = fs::metadata(path)?;
    if meta.uid() == uid && meta.gid() == gid {
        return Ok(());
    }
    std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
    Ok(())
}

#[cfg(not(unix))]
fn chown(_path: &Path, _user: &str, _group: &str) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn lookup_uid(user: &str) -> Result<u32> {
    let name = std::ffi::CString::new(user)?;
    // SAFETY: getpwnam returns a pointer to static storage or null; we only read pw_uid.
    let entry = unsafe { libc::getpwnam(name.as_ptr()) };
    if entry.is_null() {
        anyhow::bail!("unknown user '{}'", user);
    }
    Ok(unsafe { (*entry).pw_uid })
}

#[cfg(unix)]
fn lookup_gid(group: &str) -> Result<u32> {
    let name = std::ffi::CString::new(group)?;
    // SAFETY: getgrnam returns a pointer to static storage or null; we only read gr_gid.
    let entry = unsafe { libc::getgrnam(name.as_ptr()) };
    if entry.is_null() {
        anyhow::bail!("unknown group '{}'", group);
    }
    Ok(unsafe { (*entry).gr_gid })
}

/// Logs filesystem changes instead of making them.
#[derive(Debug, Clone, Default)]
pub struct DryRunFilesystem;

impl Filesystem for DryRunFilesystem {
    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn ensure_directory(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Dry run: would create directory");
        Ok(())
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        tracing::info!(path = %path.display(), bytes = content.len(), "Dry run: would write file");
        Ok(())
    }

    fn set_ownership(&self, _path: &Path, _user: &str, _group: &str) -> Result<()> {
        Ok(())
    }

    fn set_mode(&self, _path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Dry run: would remove directory");
        Ok(())
    }
}
