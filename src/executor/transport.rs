use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::process::{self, Invocation};
use crate::command::{Command, CommandEntry, ProvisioningPlan};
use crate::error::{cause_text, ProvisionError};
use crate::provision::Provisioning;

/// What an executed command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub lines: Vec<String>,
    /// Process id of a daemonized command that is still running.
    pub detached_pid: Option<u32>,
}

/// Executes queued commands against their target instances.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, resource: &str, entry: &CommandEntry) -> Result<CommandOutput, ProvisionError>;
}

/// Run every entry of `plan` in order, immediate entries first, stopping at the first failure.
///
/// A deferred entry never starts unless every immediate entry succeeded.
pub async fn execute_plan(
    transport: &dyn Transport,
    plan: &ProvisioningPlan,
) -> Result<Vec<CommandOutput>, ProvisionError> {
    let mut outputs = Vec::with_capacity(plan.len());
    for entry in plan.entries() {
        tracing::info!(
            resource = plan.resource(),
            tool = entry.command.tool(),
            instance = entry.context.target_instance.as_str(),
            stage = ?entry.stage,
            "Executing command"
        );
        let output = transport.execute(plan.resource(), entry).await?;
        outputs.push(output);
    }
    Ok(outputs)
}

fn failure(resource: &str, entry: &CommandEntry, message: String) -> ProvisionError {
    ProvisionError::CommandExecutionFailed {
        resource: resource.to_string(),
        instance: entry.context.target_instance.clone(),
        command: entry.command.redacted(),
        message,
    }
}

/// Runs commands on this host through `sqlplus`, `srvctl` and `orapwd`.
pub struct ShellTransport {
    services: Provisioning,
}

impl ShellTransport {
    pub fn new(services: Provisioning) -> Self {
        Self { services }
    }

    fn oracle_home(&self, entry: &CommandEntry) -> Result<String> {
        if let Some(home) = &entry.context.oracle_home {
            return Ok(home.clone());
        }
        let instance = entry.context.target_instance.as_str();
        if let Some(registered) = self.services.registry.entry(instance)? {
            return Ok(registered.home);
        }
        std::env::var("ORACLE_HOME").with_context(|| {
            format!(
                "Instance '{}' is not in oratab and ORACLE_HOME is not set",
                instance
            )
        })
    }

    fn environment(&self, entry: &CommandEntry) -> Result<HashMap<String, String>> {
        let mut env = HashMap::new();
        env.insert("ORACLE_SID".to_string(), entry.context.target_instance.clone());
        env.insert("ORACLE_HOME".to_string(), self.oracle_home(entry)?);
        Ok(env)
    }

    fn tool_path(&self, env: &HashMap<String, String>, binary: &str) -> String {
        if Path::new(binary).is_absolute() || binary.contains('/') {
            return binary.to_string();
        }
        match env.get("ORACLE_HOME") {
            Some(home) if Path::new(home).join("bin").join(binary).exists() => {
                format!("{}/bin/{}", home, binary)
            }
            _ => binary.to_string(),
        }
    }

    async fn run_tool(&self, entry: &CommandEntry, binary: &str, args: Vec<String>, stdin: Option<String>) -> Result<CommandOutput> {
        let env = self.environment(entry)?;
        let program = self.tool_path(&env, binary);
        let invocation = Invocation {
            program: &program,
            args,
            env,
            stdin,
            working_dir: None,
        };

        if entry.context.daemonized {
            let pid = process::spawn_detached(&invocation).await?;
            return Ok(CommandOutput {
                exit_code: 0,
                lines: Vec::new(),
                detached_pid: Some(pid),
            });
        }

        let result = process::run(&invocation, entry.context.timeout).await?;
        if !result.success() {
            bail!("{}", result.error_message());
        }
        Ok(CommandOutput {
            exit_code: result.exit_code,
            lines: result.stdout_lines,
            detached_pid: None,
        })
    }

    async fn dispatch(&self, entry: &CommandEntry) -> Result<CommandOutput> {
        let settings = &self.services.settings;
        match &entry.command {
            Command::Sql(text) => {
                let args = vec!["-S".to_string(), "-L".to_string(), "/ as sysdba".to_string()];
                self.run_tool(entry, &settings.sqlplus_binary, args, Some(sql_script(text)))
                    .await
            }
            Command::Srvctl(args) => {
                self.run_tool(entry, &settings.srvctl_binary, split_args(args), None)
                    .await
            }
            Command::Orapwd(args) => {
                self.run_tool(entry, &settings.orapwd_binary, split_args(args), None)
                    .await
            }
            Command::AddRegistryEntry {
                sid,
                home,
                autostart,
            } => {
                self.services.registry.ensure_entry(sid, home, *autostart)?;
                Ok(CommandOutput::default())
            }
            Command::RemoveDirectories(dirs) => {
                for dir in dirs {
                    self.services.fs.remove_directory(Path::new(dir))?;
                }
                Ok(CommandOutput::default())
            }
            Command::RemoveRegistryEntry(sid) => {
                self.services.registry.remove_entry(sid)?;
                Ok(CommandOutput::default())
            }
        }
    }
}

#[async_trait]
impl Transport for ShellTransport {
    async fn execute(&self, resource: &str, entry: &CommandEntry) -> Result<CommandOutput, ProvisionError> {
        self.dispatch(entry).await.map_err(|e| {
            let message = cause_text(&e);
            tracing::error!(
                resource,
                command = entry.command.redacted().as_str(),
                error = %message,
                "Command failed"
            );
            failure(resource, entry, message)
        })
    }
}

/// Wrap a statement or `@script` so sqlplus stops on the first error.
fn sql_script(text: &str) -> String {
    let text = text.trim();
    let terminated = text.starts_with('@') || text.ends_with(';');
    format!(
        "whenever sqlerror exit failure\n{}{}\nexit\n",
        text,
        if terminated { "" } else { ";" }
    )
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(|a| a.to_string()).collect()
}

/// Records commands instead of running them.
#[derive(Default)]
pub struct DryRunTransport {
    executed: Mutex<Vec<(String, CommandEntry)>>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(resource, entry)` pairs in the order they were handed over.
    pub fn executed(&self) -> Vec<(String, CommandEntry)> {
        self.executed
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn execute(&self, resource: &str, entry: &CommandEntry) -> Result<CommandOutput, ProvisionError> {
        tracing::info!(
            resource,
            command = entry.command.redacted().as_str(),
            instance = entry.context.target_instance.as_str(),
            "Dry run: skipping command"
        );
        if let Ok(mut executed) = self.executed.lock() {
            executed.push((resource.to_string(), entry.clone()));
        }
        Ok(CommandOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_get_terminated() {
        assert_eq!(
            sql_script("drop user scott cascade"),
            "whenever sqlerror exit failure\ndrop user scott cascade;\nexit\n"
        );
        assert_eq!(
            sql_script("@/u01/scripts/create.sql"),
            "whenever sqlerror exit failure\n@/u01/scripts/create.sql\nexit\n"
        );
    }

    #[test]
    fn srvctl_arguments_split_on_whitespace() {
        assert_eq!(
            split_args("add instance -d orcl -i orcl1 -n node1"),
            vec!["add", "instance", "-d", "orcl", "-i", "orcl1", "-n", "node1"]
        );
    }
}
