use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resources::Declaration;

// ─── Top-Level Manifest ─────────────────────────────────────────────────────

/// A loaded manifest: global settings plus every declared resource.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub settings: Settings,
    pub resources: Vec<Declaration>,
}

/// Global settings controlling discovery, execution and generated artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_oracle_user")]
    pub oracle_user: String,
    #[serde(default = "default_install_group")]
    pub install_group: String,
    #[serde(default = "default_oratab")]
    pub oratab: String,
    /// Instance used by SQL object declarations whose title carries no `sid/` prefix.
    #[serde(default)]
    pub default_sid: Option<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_discovery_retries")]
    pub discovery_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Directory whose files override the built-in script templates.
    #[serde(default)]
    pub template_dir: Option<String>,
    #[serde(default = "default_sqlplus_binary")]
    pub sqlplus_binary: String,
    #[serde(default = "default_srvctl_binary")]
    pub srvctl_binary: String,
    #[serde(default = "default_orapwd_binary")]
    pub orapwd_binary: String,
    /// Chown generated files to `oracle_user:install_group`.
    #[serde(default = "default_true")]
    pub manage_ownership: bool,
}

impl Settings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            oracle_user: default_oracle_user(),
            install_group: default_install_group(),
            oratab: default_oratab(),
            default_sid: None,
            command_timeout_secs: default_command_timeout_secs(),
            discovery_retries: default_discovery_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            working_dir: default_working_dir(),
            template_dir: None,
            sqlplus_binary: default_sqlplus_binary(),
            srvctl_binary: default_srvctl_binary(),
            orapwd_binary: default_orapwd_binary(),
            manage_ownership: default_true(),
        }
    }
}

fn default_oracle_user() -> String {
    "oracle".to_string()
}

fn default_install_group() -> String {
    "dba".to_string()
}

fn default_oratab() -> String {
    "/etc/oratab".to_string()
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_discovery_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_working_dir() -> String {
    ".oraprov".to_string()
}

fn default_sqlplus_binary() -> String {
    "sqlplus".to_string()
}

fn default_srvctl_binary() -> String {
    "srvctl".to_string()
}

fn default_orapwd_binary() -> String {
    "orapwd".to_string()
}

fn default_true() -> bool {
    true
}

// ─── Shared declaration fields ──────────────────────────────────────────────

/// Desired presence of a declared resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl std::fmt::Display for Ensure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ensure::Present => write!(f, "present"),
            Ensure::Absent => write!(f, "absent"),
        }
    }
}
