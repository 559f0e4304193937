use serde::{Deserialize, Serialize};

use super::{record_is, target_sid, yes_no, DiscoveryRequest, HookContext, ManagedResource};
use crate::command::{Command, CommandBuilder, ExecutionContext};
use crate::config::types::{Ensure, Settings};
use crate::discovery::RawStateRecord;
use crate::error::ProvisionError;
use crate::identity::TitleRule;
use crate::planner::reconcile::{Property, Source, ValueKind};

pub const RESOURCE_TYPE: &str = "tablespace";

pub const TABLESPACES_QUERY: &str = "select
    t.tablespace_name,
    logging,
    extent_management,
    segment_space_management,
    bigfile,
    file_name,
    to_char(increment_by, '9999999999999999999') \"INCREMENT_BY\",
    to_char(block_size, '9999999999999999999') \"BLOCK_SIZE\",
    autoextensible,
    bytes,
    to_char(maxbytes, '9999999999999999999') \"MAX_SIZE\"
  from
    dba_tablespaces t,
    dba_data_files f
  where
    t.tablespace_name = f.tablespace_name";

/// Properties that cannot be changed with a single statement once the tablespace exists.
const FIXED_PROPERTIES: [&str; 4] = [
    "bigfile",
    "extent_management",
    "segment_space_management",
    "datafile.datafile",
];

/// A tablespace, titled `sid/name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablespaceSpec {
    pub title: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub bigfile: Option<bool>,
    #[serde(default)]
    pub datafile: Option<DatafileGroup>,
    #[serde(default)]
    pub autoextend_info: Option<AutoextendGroup>,
    /// `local` or `dictionary`.
    #[serde(default)]
    pub extent_management: Option<String>,
    /// `auto` or `manual`.
    #[serde(default)]
    pub segment_space_management: Option<String>,
    #[serde(default)]
    pub logging: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatafileGroup {
    /// Datafile path; omitted for Oracle-managed files.
    #[serde(default)]
    pub datafile: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoextendGroup {
    #[serde(default)]
    pub autoextend: Option<bool>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub max_size: Option<String>,
}

fn next_extent_bytes(record: &RawStateRecord) -> Option<String> {
    let blocks: u64 = record.column_data("INCREMENT_BY")?.trim().parse().ok()?;
    let block_size: u64 = record.column_data("BLOCK_SIZE")?.trim().parse().ok()?;
    blocks.checked_mul(block_size).map(|bytes| bytes.to_string())
}

fn logging_flag(record: &RawStateRecord) -> Option<String> {
    record
        .column_data("LOGGING")
        .map(|l| yes_no(l.trim().eq_ignore_ascii_case("logging")).to_string())
}

impl TablespaceSpec {
    fn sid(&self, settings: &Settings) -> Result<String, ProvisionError> {
        target_sid(&self.title, self.sid.as_deref(), settings)
    }

    fn context(&self, settings: &Settings) -> Result<ExecutionContext, ProvisionError> {
        Ok(ExecutionContext::new(self.sid(settings)?, settings.command_timeout()))
    }

    fn autoextend_clause(&self) -> Option<String> {
        let info = self.autoextend_info.as_ref()?;
        if info.autoextend == Some(false) {
            return Some("autoextend off".to_string());
        }
        if info.autoextend.is_none() && info.next.is_none() && info.max_size.is_none() {
            return None;
        }
        let mut clause = "autoextend on".to_string();
        if let Some(next) = &info.next {
            clause.push_str(&format!(" next {}", next));
        }
        if let Some(max) = &info.max_size {
            clause.push_str(&format!(" maxsize {}", max));
        }
        Some(clause)
    }

    /// The `create tablespace` statement for this declaration.
    pub fn create_statement(&self) -> Result<String, ProvisionError> {
        let name = self.identity()?;
        let kind = if self.bigfile == Some(true) { "bigfile" } else { "smallfile" };
        let mut parts = vec![format!("create {} tablespace \"{}\"", kind, name)];

        if let Some(df) = &self.datafile {
            let mut clause = "datafile".to_string();
            if let Some(file) = &df.datafile {
                clause.push_str(&format!(" '{}'", file));
            }
            if let Some(size) = &df.size {
                clause.push_str(&format!(" size {}", size));
            }
            parts.push(clause);
        }
        if let Some(auto) = self.autoextend_clause() {
            parts.push(auto);
        }
        if let Some(logging) = self.logging {
            parts.push(if logging { "logging" } else { "nologging" }.to_string());
        }
        if let Some(em) = &self.extent_management {
            parts.push(format!("extent management {}", em));
        }
        if let Some(ssm) = &self.segment_space_management {
            parts.push(format!("segment space management {}", ssm));
        }
        Ok(parts.join(" "))
    }
}

impl ManagedResource for TablespaceSpec {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }

    fn title_rule(&self) -> TitleRule {
        TitleRule::sid_qualified()
    }

    fn properties(&self) -> Vec<Property> {
        let df = self.datafile.clone().unwrap_or_default();
        let auto = self.autoextend_info.clone().unwrap_or_default();
        vec![
            Property::flag("bigfile", self.bigfile.map(yes_no), "BIGFILE"),
            Property::group(
                "datafile",
                vec![
                    Property::text("datafile", df.datafile, "FILE_NAME"),
                    Property::size("size", df.size, "BYTES"),
                ],
            ),
            Property::group(
                "autoextend_info",
                vec![
                    Property::flag("autoextend", auto.autoextend.map(yes_no), "AUTOEXTENSIBLE"),
                    Property::leaf("next", auto.next, ValueKind::Size, Source::Derived(next_extent_bytes)),
                    Property::size("max_size", auto.max_size, "MAX_SIZE"),
                ],
            ),
            Property::text("extent_management", self.extent_management.as_ref(), "EXTENT_MANAGEMENT"),
            Property::text(
                "segment_space_management",
                self.segment_space_management.as_ref(),
                "SEGMENT_SPACE_MANAGEMENT",
            ),
            Property::leaf(
                "logging",
                self.logging.map(yes_no),
                ValueKind::Flag,
                Source::Derived(logging_flag),
            ),
        ]
    }

    fn discovery(&self, settings: &Settings) -> Result<DiscoveryRequest, ProvisionError> {
        Ok(DiscoveryRequest::sql_on(self.sid(settings)?, TABLESPACES_QUERY))
    }

    fn matches(&self, record: &RawStateRecord, settings: &Settings) -> Result<bool, ProvisionError> {
        Ok(record_is(record, "TABLESPACE_NAME", &self.identity()?, &self.sid(settings)?))
    }

    fn on_create(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        builder.add(
            Command::Sql(self.create_statement()?),
            self.context(&ctx.services.settings)?,
        );
        Ok(())
    }

    fn on_modify(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let name = self.identity()?;
        if let Some(fixed) = ctx
            .drift
            .iter()
            .find(|d| FIXED_PROPERTIES.iter().any(|p| d.is_under(p)))
        {
            return Err(ProvisionError::unsupported(
                &self.title,
                "modify",
                format!("{} cannot be changed on an existing tablespace", fixed.path),
            ));
        }

        let context = self.context(&ctx.services.settings)?;
        let file = self
            .datafile
            .as_ref()
            .and_then(|d| d.datafile.clone())
            .or_else(|| ctx.found.and_then(|r| r.column_data("FILE_NAME").map(|f| f.to_string())));
        let datafile_target = || match &file {
            Some(f) => Ok(format!("alter database datafile '{}'", f)),
            None => Err(ProvisionError::unsupported(
                &self.title,
                "modify",
                "no datafile known to resize or extend",
            )),
        };

        if ctx.drift.iter().any(|d| d.is_under("datafile.size")) {
            if let Some(size) = self.datafile.as_ref().and_then(|d| d.size.as_ref()) {
                builder.add(
                    Command::Sql(format!("{} resize {}", datafile_target()?, size)),
                    context.clone(),
                );
            }
        }
        if ctx.drift.iter().any(|d| d.is_under("autoextend_info")) {
            if let Some(clause) = self.autoextend_clause() {
                builder.add(
                    Command::Sql(format!("{} {}", datafile_target()?, clause)),
                    context.clone(),
                );
            }
        }
        if ctx.drift.iter().any(|d| d.is_under("logging")) {
            if let Some(logging) = self.logging {
                builder.add(
                    Command::Sql(format!(
                        "alter tablespace \"{}\" {}",
                        name,
                        if logging { "logging" } else { "nologging" }
                    )),
                    context,
                );
            }
        }
        Ok(())
    }

    fn on_destroy(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        builder.add(
            Command::Sql(format!(
                "drop tablespace \"{}\" including contents and datafiles",
                self.identity()?
            )),
            self.context(&ctx.services.settings)?,
        );
        Ok(())
    }
}
