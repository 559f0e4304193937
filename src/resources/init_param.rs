use std::fmt;

use serde::{Deserialize, Serialize};

use super::{record_is, target_sid, DiscoveryRequest, HookContext, ManagedResource};
use crate::command::{Command, CommandBuilder, ExecutionContext};
use crate::config::types::{Ensure, Settings};
use crate::discovery::RawStateRecord;
use crate::error::ProvisionError;
use crate::identity::TitleRule;
use crate::planner::reconcile::Property;

pub const RESOURCE_TYPE: &str = "init_param";

pub const PARAMETERS_QUERY: &str = "select name, display_value from v$parameter";

/// Where an `alter system` change takes effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamScope {
    #[default]
    Spfile,
    Memory,
    Both,
}

impl fmt::Display for ParamScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamScope::Spfile => write!(f, "spfile"),
            ParamScope::Memory => write!(f, "memory"),
            ParamScope::Both => write!(f, "both"),
        }
    }
}

/// An instance parameter, titled `sid/parameter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitParamSpec {
    pub title: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub scope: ParamScope,
    #[serde(default)]
    pub sid: Option<String>,
}

impl InitParamSpec {
    fn set_statement(&self, name: &str) -> Result<String, ProvisionError> {
        let value = self
            .value
            .as_deref()
            .ok_or_else(|| ProvisionError::invalid(&self.title, "value is required"))?;
        Ok(format!(
            "alter system set \"{}\" = {} scope={}",
            name, value, self.scope
        ))
    }

    fn context(&self, settings: &Settings) -> Result<ExecutionContext, ProvisionError> {
        Ok(ExecutionContext::new(
            target_sid(&self.title, self.sid.as_deref(), settings)?,
            settings.command_timeout(),
        ))
    }
}

impl ManagedResource for InitParamSpec {
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
        vec![Property::text("value", self.value.as_ref(), "DISPLAY_VALUE")]
    }

    fn discovery(&self, _settings: &Settings) -> Result<DiscoveryRequest, ProvisionError> {
        Ok(DiscoveryRequest::sql_on_all_sids(PARAMETERS_QUERY))
    }

    fn matches(&self, record: &RawStateRecord, settings: &Settings) -> Result<bool, ProvisionError> {
        let sid = target_sid(&self.title, self.sid.as_deref(), settings)?;
        Ok(record_is(record, "NAME", &self.identity()?, &sid))
    }

    fn on_create(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let name = self.identity()?;
        builder.add(
            Command::Sql(self.set_statement(name.as_str())?),
            self.context(&ctx.services.settings)?,
        );
        Ok(())
    }

    fn on_modify(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        self.on_create(builder, ctx)
    }

    fn on_destroy(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let name = self.identity()?;
        builder.add(
            Command::Sql(format!(
                "alter system reset \"{}\" scope={}",
                name, self.scope
            )),
            self.context(&ctx.services.settings)?,
        );
        Ok(())
    }
}
