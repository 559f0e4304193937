use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// One line of the host-local instance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OraTabEntry {
    pub sid: String,
    pub home: String,
    pub autostart: bool,
}

impl OraTabEntry {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut fields = line.splitn(3, ':');
        let sid = fields.next()?.trim();
        let home = fields.next()?.trim();
        let autostart = fields
            .next()
            .map(|f| f.trim().eq_ignore_ascii_case("y"))
            .unwrap_or(false);
        if sid.is_empty() {
            return None;
        }
        Some(Self {
            sid: sid.to_string(),
            home: home.to_string(),
            autostart,
        })
    }

    fn render(&self) -> String {
        format!(
            "{}:{}:{}",
            self.sid,
            self.home,
            if self.autostart { "Y" } else { "N" }
        )
    }
}

/// The registry boot and start tooling consults to find instances on this host.
pub trait HostRegistry: Send + Sync {
    /// Insert or update the entry for `sid`.
    fn ensure_entry(&self, sid: &str, home: &str, autostart: bool) -> Result<()>;

    /// Remove the entry for `sid` if present.
    fn remove_entry(&self, sid: &str) -> Result<()>;

    fn entries(&self) -> Result<Vec<OraTabEntry>>;

    fn entry(&self, sid: &str) -> Result<Option<OraTabEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.sid == sid))
    }
}

/// An `oratab` file (`sid:home:Y|N` per line). Comments and unrelated lines are preserved.
#[derive(Debug, Clone)]
pub struct OraTab {
    path: PathBuf,
}

impl OraTab {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl HostRegistry for OraTab {
    fn ensure_entry(&self, sid: &str, home: &str, autostart: bool) -> Result<()> {
        let wanted = OraTabEntry {
            sid: sid.to_string(),
            home: home.to_string(),
            autostart,
        };
        let mut lines = self.read_lines()?;
        let existing = lines
            .iter()
            .position(|l| OraTabEntry::parse(l).is_some_and(|e| e.sid == sid));

        match existing {
            Some(idx) if OraTabEntry::parse(&lines[idx]).as_ref() == Some(&wanted) => {
                return Ok(());
            }
            Some(idx) => lines[idx] = wanted.render(),
            None => lines.push(wanted.render()),
        }

        tracing::info!(sid, home, autostart, path = %self.path.display(), "Updated oratab entry");
        self.write_lines(&lines)
    }

    fn remove_entry(&self, sid: &str) -> Result<()> {
        let lines = self.read_lines()?;
        let kept: Vec<String> = lines
            .iter()
            .filter(|l| !OraTabEntry::parse(l).is_some_and(|e| e.sid == sid))
            .cloned()
            .collect();
        if kept.len() == lines.len() {
            return Ok(());
        }
        tracing::info!(sid, path = %self.path.display(), "Removed oratab entry");
        self.write_lines(&kept)
    }

    fn entries(&self) -> Result<Vec<OraTabEntry>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|l| OraTabEntry::parse(l))
            .collect())
    }
}

/// Reads a registry but only logs the changes it would make.
pub struct ReadOnlyRegistry<R> {
    inner: R,
}

impl<R: HostRegistry> ReadOnlyRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: HostRegistry> HostRegistry for ReadOnlyRegistry<R> {
    fn ensure_entry(&self, sid: &str, home: &str, autostart: bool) -> Result<()> {
        tracing::info!(sid, home, autostart, "Dry run: would register instance");
        Ok(())
    }

    fn remove_entry(&self, sid: &str) -> Result<()> {
        tracing::info!(sid, "Dry run: would deregister instance");
        Ok(())
    }

    fn entries(&self) -> Result<Vec<OraTabEntry>> {
        self.inner.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        assert!(OraTabEntry::parse("# comment").is_none());
        assert!(OraTabEntry::parse("   ").is_none());
        let entry = OraTabEntry::parse("orcl:/u01/app/oracle/product/19c:Y").unwrap();
        assert_eq!(entry.sid, "orcl");
        assert_eq!(entry.home, "/u01/app/oracle/product/19c");
        assert!(entry.autostart);
    }

    #[test]
    fn missing_autostart_field_means_no() {
        let entry = OraTabEntry::parse("orcl:/u01/home").unwrap();
        assert!(!entry.autostart);
    }
}
