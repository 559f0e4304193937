use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::{RawStateRecord, StateSource, Statement};
use crate::config::types::Settings;
use crate::executor::process::{self, Invocation};
use crate::provision::oratab::HostRegistry;

/// Runs discovery queries through sqlplus as SYSDBA on the named instance.
pub struct SqlPlusSource {
    binary: String,
    timeout: Duration,
    registry: Arc<dyn HostRegistry>,
}

impl SqlPlusSource {
    pub fn new(settings: &Settings, registry: Arc<dyn HostRegistry>) -> Self {
        Self {
            binary: settings.sqlplus_binary.clone(),
            timeout: settings.command_timeout(),
            registry,
        }
    }
}

#[async_trait]
impl StateSource for SqlPlusSource {
    async fn query(&self, node: &str, statement: &Statement) -> Result<Vec<RawStateRecord>> {
        let entry = self
            .registry
            .entry(node)?
            .with_context(|| format!("Instance '{}' is not registered in oratab", node))?;

        let mut env = HashMap::new();
        env.insert("ORACLE_SID".to_string(), node.to_string());
        env.insert("ORACLE_HOME".to_string(), entry.home.clone());

        let invocation = Invocation {
            program: &self.binary,
            args: vec!["-S".to_string(), "-L".to_string(), "/ as sysdba".to_string()],
            env,
            stdin: Some(query_script(statement)),
            working_dir: None,
        };

        let result = process::run(&invocation, self.timeout).await?;
        if !result.success() {
            bail!(
                "sqlplus query on '{}' failed: {}",
                node,
                result.error_message()
            );
        }

        let records = parse_csv_output(&result.stdout_lines);
        tracing::debug!(node, rows = records.len(), "sqlplus query completed");
        Ok(records)
    }
}

fn query_script(statement: &Statement) -> String {
    let text = statement.text().trim().trim_end_matches(';');
    format!(
        "set markup csv on quote on\nset heading on\nset feedback off\nset pagesize 50000\n\
         whenever sqlerror exit failure\n{};\nexit\n",
        text
    )
}

/// Turn sqlplus CSV output (header line, then one line per row) into records.
fn parse_csv_output(lines: &[String]) -> Vec<RawStateRecord> {
    let mut rows = lines.iter().filter(|l| !l.trim().is_empty());
    let header = match rows.next() {
        Some(h) => parse_csv_row(h),
        None => return Vec::new(),
    };

    rows.map(|line| {
        header
            .iter()
            .cloned()
            .zip(parse_csv_row(line))
            .collect::<RawStateRecord>()
    })
    .collect()
}

fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
