#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use oraprov::command::{Command, CommandEntry};
use oraprov::config::types::Settings;
use oraprov::error::ProvisionError;
use oraprov::executor::transport::{CommandOutput, Transport};
use oraprov::discovery::{RawStateRecord, StateSource, Statement};
use oraprov::provision::filesystem::Filesystem;
use oraprov::provision::oratab::{HostRegistry, OraTabEntry};
use oraprov::provision::templates::TemplateSet;
use oraprov::provision::Provisioning;

// ─── Filesystem ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    EnsureDirectory(PathBuf),
    WriteFile(PathBuf),
    RemoveDirectory(PathBuf),
}

/// Records every mutating call; optionally fails writes whose path contains a marker.
#[derive(Default)]
pub struct RecordingFilesystem {
    ops: Mutex<Vec<FsOp>>,
    existing: HashSet<PathBuf>,
    fail_writes_containing: Option<String>,
}

impl RecordingFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes(marker: &str) -> Self {
        Self {
            fail_writes_containing: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// Directories that are present before any call.
    pub fn with_existing(mut self, dirs: &[PathBuf]) -> Self {
        self.existing.extend(dirs.iter().cloned());
        self
    }

    pub fn ops(&self) -> Vec<FsOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                FsOp::RemoveDirectory(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn written(&self) -> Vec<PathBuf> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                FsOp::WriteFile(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl Filesystem for RecordingFilesystem {
    fn directory_exists(&self, path: &Path) -> bool {
        self.existing.contains(path)
    }

    fn ensure_directory(&self, path: &Path) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(FsOp::EnsureDirectory(path.to_path_buf()));
        Ok(())
    }

    fn write_file(&self, path: &Path, _content: &str) -> Result<()> {
        if let Some(marker) = &self.fail_writes_containing {
            if path.to_string_lossy().contains(marker.as_str()) {
                bail!("disk full writing {}", path.display());
            }
        }
        self.ops
            .lock()
            .unwrap()
            .push(FsOp::WriteFile(path.to_path_buf()));
        Ok(())
    }

    fn set_ownership(&self, _path: &Path, _user: &str, _group: &str) -> Result<()> {
        Ok(())
    }

    fn set_mode(&self, _path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(FsOp::RemoveDirectory(path.to_path_buf()));
        Ok(())
    }
}

// ─── Host registry ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRegistry {
    entries: Mutex<Vec<OraTabEntry>>,
}

impl MemoryRegistry {
    pub fn with_sids(sids: &[&str]) -> Self {
        let entries = sids
            .iter()
            .map(|sid| OraTabEntry {
                sid: sid.to_string(),
                home: "/u01/app/oracle/product/19c".to_string(),
                autostart: true,
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl HostRegistry for MemoryRegistry {
    fn ensure_entry(&self, sid: &str, home: &str, autostart: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.sid != sid);
        entries.push(OraTabEntry {
            sid: sid.to_string(),
            home: home.to_string(),
            autostart,
        });
        Ok(())
    }

    fn remove_entry(&self, sid: &str) -> Result<()> {
        self.entries.lock().unwrap().retain(|e| e.sid != sid);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<OraTabEntry>> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

// ─── State source ────────────────────────────────────────────────────────────

/// Canned rows per node; nodes without rows fail with "connection refused".
#[derive(Default)]
pub struct FakeSource {
    rows: HashMap<String, Vec<RawStateRecord>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: &str, rows: Vec<RawStateRecord>) -> Self {
        self.rows.insert(node.to_string(), rows);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateSource for FakeSource {
    async fn query(&self, node: &str, _statement: &Statement) -> Result<Vec<RawStateRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.rows.get(node) {
            Some(rows) => Ok(rows.clone()),
            None => bail!("connection refused by {}", node),
        }
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Applies registry commands to a `MemoryRegistry` and fails any command whose text contains
/// the marker with an Oracle error.
pub struct ScriptedTransport {
    registry: Arc<MemoryRegistry>,
    fail_containing: Option<String>,
    executed: Mutex<Vec<Command>>,
}

impl ScriptedTransport {
    pub fn new(registry: Arc<MemoryRegistry>) -> Self {
        Self {
            registry,
            fail_containing: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_containing = Some(marker.to_string());
        self
    }

    pub fn executed(&self) -> Vec<Command> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, resource: &str, entry: &CommandEntry) -> Result<CommandOutput, ProvisionError> {
        self.executed.lock().unwrap().push(entry.command.clone());
        if let Some(marker) = &self.fail_containing {
            if entry.command.to_string().contains(marker.as_str()) {
                return Err(ProvisionError::CommandExecutionFailed {
                    resource: resource.to_string(),
                    instance: entry.context.target_instance.clone(),
                    command: entry.command.redacted(),
                    message: "ORA-01501: CREATE DATABASE failed".to_string(),
                });
            }
        }
        let applied = match &entry.command {
            Command::AddRegistryEntry {
                sid,
                home,
                autostart,
            } => self.registry.ensure_entry(sid, home, *autostart),
            Command::RemoveRegistryEntry(sid) => self.registry.remove_entry(sid),
            _ => Ok(()),
        };
        applied.map_err(|e| ProvisionError::CommandExecutionFailed {
            resource: resource.to_string(),
            instance: entry.context.target_instance.clone(),
            command: entry.command.redacted(),
            message: e.to_string(),
        })?;
        Ok(CommandOutput::default())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub fn services(
    settings: Settings,
    fs: Arc<RecordingFilesystem>,
    registry: Arc<MemoryRegistry>,
) -> Provisioning {
    Provisioning {
        settings,
        fs,
        registry,
        templates: Arc::new(TemplateSet::new(None)),
    }
}

pub fn record(pairs: &[(&str, &str)]) -> RawStateRecord {
    pairs
        .iter()
        .fold(RawStateRecord::new(), |r, (k, v)| r.with(k, *v))
}
