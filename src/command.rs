use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

static PASSWORD_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(password=)\S+").expect("valid password pattern"));
static IDENTIFIED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(identified by )\S+").expect("valid identified-by pattern"));

/// A unit of work for the execution transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum Command {
    /// A statement or `@script` run through sqlplus.
    Sql(String),
    /// Arguments for the cluster control plane (`srvctl`).
    Srvctl(String),
    /// Arguments for the password file utility (`orapwd`).
    Orapwd(String),
    /// Local upsert of a host registry entry.
    AddRegistryEntry {
        sid: String,
        home: String,
        autostart: bool,
    },
    /// Local removal of provisioning directories.
    RemoveDirectories(Vec<String>),
    /// Local removal of a host registry entry.
    RemoveRegistryEntry(String),
}

impl Command {
    pub fn tool(&self) -> &'static str {
        match self {
            Command::Sql(_) => "sql",
            Command::Srvctl(_) => "srvctl",
            Command::Orapwd(_) => "orapwd",
            Command::AddRegistryEntry { .. } => "add_registry_entry",
            Command::RemoveDirectories(_) => "remove_directories",
            Command::RemoveRegistryEntry(_) => "remove_registry_entry",
        }
    }

    /// The command text with secrets masked, for display and logs.
    pub fn redacted(&self) -> String {
        let text = self.to_string();
        match self {
            Command::Orapwd(_) | Command::Sql(_) => redact_secrets(&text),
            _ => text,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Sql(s) | Command::Srvctl(s) | Command::Orapwd(s) => f.write_str(s),
            Command::AddRegistryEntry {
                sid,
                home,
                autostart,
            } => write!(f, "{}:{}:{}", sid, home, if *autostart { "Y" } else { "N" }),
            Command::RemoveDirectories(dirs) => write!(f, "{}", dirs.join(" ")),
            Command::RemoveRegistryEntry(sid) => f.write_str(sid),
        }
    }
}

fn redact_secrets(text: &str) -> String {
    let text = PASSWORD_ARG.replace_all(text, "${1}********");
    IDENTIFIED_BY.replace_all(&text, "${1}********").into_owned()
}

/// Where and how a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub target_instance: String,
    /// Zero means no timeout.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub daemonized: bool,
    /// Oracle home to run under when the instance is not registered yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_home: Option<String>,
}

impl ExecutionContext {
    pub fn new(target_instance: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target_instance: target_instance.into(),
            timeout,
            daemonized: false,
            oracle_home: None,
        }
    }

    /// A context for long-running steps that must not be cut off.
    pub fn unbounded(target_instance: impl Into<String>) -> Self {
        Self::new(target_instance, Duration::ZERO)
    }

    pub fn daemonized(mut self, daemonized: bool) -> Self {
        self.daemonized = daemonized;
        self
    }

    pub fn with_home(mut self, oracle_home: impl Into<String>) -> Self {
        self.oracle_home = Some(oracle_home.into());
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.timeout.is_zero()
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

/// Which queue an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Immediate,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEntry {
    pub command: Command,
    pub context: ExecutionContext,
    pub stage: Stage,
}

/// Assembles the ordered commands for one lifecycle transition of one resource.
///
/// The builder only collects data; `build` consumes it, so each plan gets a fresh builder.
#[derive(Debug)]
pub struct CommandBuilder {
    resource: String,
    immediate: Vec<CommandEntry>,
    deferred: Vec<CommandEntry>,
}

impl CommandBuilder {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            immediate: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Queue a command in the immediate batch.
    pub fn add(&mut self, command: Command, context: ExecutionContext) {
        tracing::debug!(
            resource = self.resource.as_str(),
            tool = command.tool(),
            instance = context.target_instance.as_str(),
            "Queued command"
        );
        self.immediate.push(CommandEntry {
            command,
            context,
            stage: Stage::Immediate,
        });
    }

    /// Queue a command to run once the whole immediate batch has succeeded.
    pub fn after(&mut self, command: Command, context: ExecutionContext) {
        tracing::debug!(
            resource = self.resource.as_str(),
            tool = command.tool(),
            instance = context.target_instance.as_str(),
            "Queued deferred command"
        );
        self.deferred.push(CommandEntry {
            command,
            context,
            stage: Stage::Deferred,
        });
    }

    pub fn build(self) -> ProvisioningPlan {
        ProvisioningPlan {
            resource: self.resource,
            immediate: self.immediate,
            deferred: self.deferred,
        }
    }
}

/// The frozen, ordered commands of one lifecycle transition: immediate entries, then deferred.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningPlan {
    resource: String,
    immediate: Vec<CommandEntry>,
    deferred: Vec<CommandEntry>,
}

impl ProvisioningPlan {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn immediate(&self) -> &[CommandEntry] {
        &self.immediate
    }

    pub fn deferred(&self) -> &[CommandEntry] {
        &self.deferred
    }

    /// All entries in execution order.
    pub fn entries(&self) -> impl Iterator<Item = &CommandEntry> {
        self.immediate.iter().chain(self.deferred.iter())
    }

    pub fn len(&self) -> usize {
        self.immediate.len() + self.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execution position of the first entry matching `pred`.
    pub fn position<F>(&self, pred: F) -> Option<usize>
    where
        F: Fn(&CommandEntry) -> bool,
    {
        self.entries().position(pred)
    }
}
