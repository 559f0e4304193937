use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing;

/// Result of running an external tool.
#[derive(Debug, Default)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Extract a human-readable error message from the result.
    pub fn error_message(&self) -> String {
        // Oracle tools report errors as ORA-/SP2-/PRCD- lines on stdout
        let oracle_errors = extract_errors(&self.stdout_lines);
        if !oracle_errors.is_empty() {
            return oracle_errors.join("; ");
        }

        let stderr = self.stderr_lines.join("\n");
        if !stderr.trim().is_empty() {
            return stderr;
        }

        let meaningful: Vec<&String> = self
            .stdout_lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if !meaningful.is_empty() {
            return meaningful
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("\n");
        }

        format!("exit code {}", self.exit_code)
    }
}

static ORACLE_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*((ORA|SP2|PRC[A-Z]|PRKO|CRS|OPW)-\d+:.*)$").expect("valid error pattern")
});

/// Pull Oracle error lines (`ORA-01031: ...`, `SP2-0310: ...`, `PRCD-1120: ...`) out of tool output.
pub fn extract_errors(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| ORACLE_ERROR.captures(line).map(|c| c[1].trim().to_string()))
        .collect()
}

/// An external tool invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdin: Option<String>,
    pub working_dir: Option<&'a Path>,
}

/// Run a tool to completion, bounded by `timeout` unless it is zero.
pub async fn run(invocation: &Invocation<'_>, timeout: Duration) -> Result<ProcessResult> {
    tracing::debug!(
        program = invocation.program,
        args = ?invocation.args,
        timeout_secs = timeout.as_secs(),
        "Running tool"
    );

    let mut cmd = spawnable(invocation);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", invocation.program))?;

    if let Some(input) = &invocation.stdin {
        let mut stdin = child.stdin.take().context("Tool stdin unavailable")?;
        stdin.write_all(input.as_bytes()).await?;
        drop(stdin);
    }

    let stdout = child.stdout.take().context("Tool stdout unavailable")?;
    let stderr = child.stderr.take().context("Tool stderr unavailable")?;

    let mut stdout_stream = BufReader::new(stdout).lines();
    let mut stderr_stream = BufReader::new(stderr).lines();

    let stdout_handle = tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = stdout_stream.next_line().await {
            tracing::trace!(stream = "stdout", "{}", line);
            lines.push(line);
        }
        lines
    });

    let stderr_handle = tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = stderr_stream.next_line().await {
            tracing::trace!(stream = "stderr", "{}", line);
            lines.push(line);
        }
        lines
    });

    let status = if timeout.is_zero() {
        child.wait().await?
    } else {
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                bail!(
                    "{} timed out after {}s",
                    invocation.program,
                    timeout.as_secs()
                );
            }
        }
    };

    let stdout_lines = stdout_handle.await?;
    let stderr_lines = stderr_handle.await?;
    let exit_code = status.code().unwrap_or(-1);

    tracing::debug!(program = invocation.program, exit_code, "Tool completed");

    Ok(ProcessResult {
        exit_code,
        stdout_lines,
        stderr_lines,
    })
}

/// Start a tool without waiting for it; used for daemonized commands.
pub async fn spawn_detached(invocation: &Invocation<'_>) -> Result<u32> {
    let mut cmd = spawnable(invocation);
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", invocation.program))?;

    if let Some(input) = &invocation.stdin {
        let mut stdin = child.stdin.take().context("Tool stdin unavailable")?;
        stdin.write_all(input.as_bytes()).await?;
    }

    let pid = child.id().unwrap_or_default();
    tracing::info!(program = invocation.program, pid, "Started detached tool");
    Ok(pid)
}

fn spawnable(invocation: &Invocation<'_>) -> Command {
    let mut cmd = Command::new(invocation.program);
    cmd.args(&invocation.args).envs(&invocation.env);
    if let Some(dir) = invocation.working_dir {
        cmd.current_dir(dir);
    }
    if invocation.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd
}
