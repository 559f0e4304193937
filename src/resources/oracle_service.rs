use serde::{Deserialize, Serialize};

use super::{record_is, target_sid, DiscoveryRequest, HookContext, ManagedResource};
use crate::command::{Command, CommandBuilder, ExecutionContext};
use crate::config::types::{Ensure, Settings};
use crate::discovery::RawStateRecord;
use crate::error::ProvisionError;
use crate::identity::TitleRule;
use crate::planner::reconcile::Property;

pub const RESOURCE_TYPE: &str = "oracle_service";

pub const SERVICES_QUERY: &str = "select name from dba_services where name not like 'SYS$%'";

/// A database service, titled `sid/service`. Services are managed through `service_names`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleServiceSpec {
    pub title: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub sid: Option<String>,
}

impl OracleServiceSpec {
    fn set_services(&self, services: &[String], settings: &Settings) -> Result<(Command, ExecutionContext), ProvisionError> {
        let sid = target_sid(&self.title, self.sid.as_deref(), settings)?;
        Ok((
            Command::Sql(format!(
                "alter system set service_names = '{}'",
                services.join(",")
            )),
            ExecutionContext::new(sid, settings.command_timeout()),
        ))
    }
}

/// Service names already defined on the instance.
fn current_services(peers: &[RawStateRecord]) -> Vec<String> {
    peers
        .iter()
        .filter_map(|r| r.column_data("NAME"))
        .map(|n| n.to_string())
        .collect()
}

impl ManagedResource for OracleServiceSpec {
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
        Vec::new()
    }

    fn discovery(&self, settings: &Settings) -> Result<DiscoveryRequest, ProvisionError> {
        let sid = target_sid(&self.title, self.sid.as_deref(), settings)?;
        Ok(DiscoveryRequest::sql_on(sid, SERVICES_QUERY))
    }

    fn matches(&self, record: &RawStateRecord, settings: &Settings) -> Result<bool, ProvisionError> {
        let sid = target_sid(&self.title, self.sid.as_deref(), settings)?;
        Ok(record_is(record, "NAME", &self.identity()?, &sid))
    }

    fn on_create(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let name = self.identity()?;
        let mut services = current_services(ctx.peers);
        if !services.iter().any(|s| name.matches(s)) {
            services.push(name.to_string());
        }
        let (command, context) = self.set_services(&services, &ctx.services.settings)?;
        builder.add(command, context);
        Ok(())
    }

    fn on_modify(&self, _builder: &mut CommandBuilder, _ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        Err(ProvisionError::unsupported(
            &self.title,
            "modify",
            "a service has no modifiable properties",
        ))
    }

    fn on_destroy(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let name = self.identity()?;
        let services: Vec<String> = current_services(ctx.peers)
            .into_iter()
            .filter(|s| !name.matches(s))
            .collect();
        let (command, context) = self.set_services(&services, &ctx.services.settings)?;
        builder.add(command, context);
        Ok(())
    }
}
