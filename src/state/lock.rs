use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File-based lock serializing work on one resource identity.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquire `<working_dir>/locks/<kind>-<identity>.lock`. Fails if the lock already exists.
    pub fn acquire(working_dir: &str, kind: &str, identity: &str) -> Result<Self> {
        let lock_path = Self::path_for(working_dir, kind, identity);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // create_new makes the existence check and the write one step
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock_path).unwrap_or_default();
                bail!(
                    "'{}' is locked by another run ({})",
                    identity,
                    holder.replace('\n', ", ")
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", lock_path.display()))
            }
        };

        let lock_info = format!(
            "pid={}\ntime={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        file.write_all(lock_info.as_bytes())?;

        tracing::debug!(path = %lock_path.display(), "Lock acquired");
        Ok(Self { lock_path })
    }

    pub fn path_for(working_dir: &str, kind: &str, identity: &str) -> PathBuf {
        let safe: String = identity
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        Path::new(working_dir)
            .join("locks")
            .join(format!("{}-{}.lock", kind, safe))
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock file.
    pub fn release(self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
