use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DiscoveryRequest, HookContext, ManagedResource, ScopeRequest, SourceKind};
use crate::command::CommandBuilder;
use crate::config::types::{Ensure, Settings};
use crate::discovery::{RawStateRecord, Statement};
use crate::error::ProvisionError;
use crate::identity::TitleRule;
use crate::planner::reconcile::Property;
use crate::provision::database::DatabaseProvisioner;
use crate::provision::topology::Topology;

pub const RESOURCE_TYPE: &str = "ora_database";

/// Statement understood by the host registry source: list every registered instance.
pub const REGISTRY_LISTING: &str = "oratab";

/// An Oracle database, standalone or clustered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSpec {
    /// The database name (at most eight characters).
    pub title: String,
    #[serde(default)]
    pub ensure: Ensure,
    pub oracle_home: String,
    pub oracle_base: String,
    /// Owner of generated files; defaults to `settings.oracle_user`.
    #[serde(default)]
    pub oracle_user: Option<String>,
    #[serde(default)]
    pub install_group: Option<String>,
    #[serde(default)]
    pub sys_password: Option<String>,
    #[serde(default)]
    pub system_password: Option<String>,
    /// Base content of the generated `init<instance>.ora`.
    #[serde(default)]
    pub init_ora_content: String,
    /// Seconds allowed for bounded commands; defaults to `settings.command_timeout_secs`.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// `reuse` to add `CONTROLFILE REUSE`.
    #[serde(default)]
    pub control_file: Option<String>,
    #[serde(default)]
    pub maxdatafiles: Option<u32>,
    #[serde(default)]
    pub maxinstances: Option<u32>,
    #[serde(default)]
    pub character_set: Option<String>,
    #[serde(default)]
    pub national_character_set: Option<String>,
    /// `bigfile` or `smallfile`.
    #[serde(default)]
    pub tablespace_type: Option<String>,
    #[serde(default)]
    pub logfile: Option<String>,
    #[serde(default)]
    pub logfile_groups: Vec<LogfileGroup>,
    #[serde(default)]
    pub maxlogfiles: Option<u32>,
    #[serde(default)]
    pub maxlogmembers: Option<u32>,
    #[serde(default)]
    pub maxloghistory: Option<u32>,
    #[serde(default)]
    pub archivelog: bool,
    #[serde(default)]
    pub force_logging: bool,
    /// `local` or `dictionary`.
    #[serde(default)]
    pub extent_management: Option<String>,
    #[serde(default)]
    pub datafiles: Vec<DatafileClause>,
    #[serde(default)]
    pub sysaux_datafiles: Vec<DatafileClause>,
    #[serde(default)]
    pub default_tablespace: Option<TablespaceClause>,
    #[serde(default)]
    pub default_temporary_tablespace: Option<TablespaceClause>,
    #[serde(default)]
    pub undo_tablespace: Option<TablespaceClause>,
    /// Shared spfile directory registered with the cluster.
    #[serde(default)]
    pub spfile_location: Option<String>,
    /// Instance name → node. Empty means standalone.
    #[serde(default)]
    pub instances: BTreeMap<String, String>,
    #[serde(default)]
    pub scan_name: Option<String>,
    #[serde(default)]
    pub scan_port: Option<u16>,
    #[serde(default = "default_true")]
    pub autostart: bool,
    /// Run the bootstrap scripts after creation.
    #[serde(default = "default_true")]
    pub create_catalog: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogfileGroup {
    pub file_name: String,
    pub size: String,
    #[serde(default)]
    pub reuse: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatafileClause {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub reuse: bool,
    #[serde(default)]
    pub autoextend: Option<AutoextendClause>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoextendClause {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub maxsize: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablespaceClause {
    pub name: String,
    #[serde(default)]
    pub datafile: Option<DatafileClause>,
}

impl DatabaseSpec {
    /// A minimal declaration, mostly useful for tests and tooling.
    pub fn new(title: impl Into<String>, oracle_home: impl Into<String>, oracle_base: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ensure: Ensure::Present,
            oracle_home: oracle_home.into(),
            oracle_base: oracle_base.into(),
            oracle_user: None,
            install_group: None,
            sys_password: None,
            system_password: None,
            init_ora_content: String::new(),
            timeout: None,
            control_file: None,
            maxdatafiles: None,
            maxinstances: None,
            character_set: None,
            national_character_set: None,
            tablespace_type: None,
            logfile: None,
            logfile_groups: Vec::new(),
            maxlogfiles: None,
            maxlogmembers: None,
            maxloghistory: None,
            archivelog: false,
            force_logging: false,
            extent_management: None,
            datafiles: Vec::new(),
            sysaux_datafiles: Vec::new(),
            default_tablespace: None,
            default_temporary_tablespace: None,
            undo_tablespace: None,
            spfile_location: None,
            instances: BTreeMap::new(),
            scan_name: None,
            scan_port: None,
            autostart: true,
            create_catalog: true,
        }
    }

    pub fn topology(&self) -> Topology {
        Topology::resolve(&self.instances)
    }

    /// The instance this host registers for the database.
    pub fn instance_name(&self) -> Result<String, ProvisionError> {
        let name = self.identity()?;
        Ok(self.topology().effective_instance_name(name.as_str()))
    }
}

impl ManagedResource for DatabaseSpec {
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
        TitleRule::database()
    }

    fn properties(&self) -> Vec<Property> {
        vec![Property::flag("autostart", Some(super::yes_no(self.autostart)), "AUTOSTART")]
    }

    fn discovery(&self, _settings: &Settings) -> Result<DiscoveryRequest, ProvisionError> {
        Ok(DiscoveryRequest {
            source: SourceKind::HostRegistry,
            statement: Statement::new(REGISTRY_LISTING),
            scope: ScopeRequest::Host,
        })
    }

    fn matches(&self, record: &RawStateRecord, _settings: &Settings) -> Result<bool, ProvisionError> {
        let instance = self.instance_name()?;
        Ok(record
            .column_data("NAME")
            .is_some_and(|name| name.eq_ignore_ascii_case(&instance)))
    }

    fn on_create(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        DatabaseProvisioner::new(self, ctx.services)?.create(builder)
    }

    fn on_modify(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        DatabaseProvisioner::new(self, ctx.services)?.modify(builder)
    }

    fn on_destroy(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        DatabaseProvisioner::new(self, ctx.services)?.destroy(builder)
    }
}
