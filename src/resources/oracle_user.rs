use serde::{Deserialize, Serialize};

use super::{record_is, target_sid, DiscoveryRequest, HookContext, ManagedResource};
use crate::command::{Command, CommandBuilder, ExecutionContext};
use crate::config::types::{Ensure, Settings};
use crate::discovery::RawStateRecord;
use crate::error::ProvisionError;
use crate::identity::TitleRule;
use crate::planner::reconcile::Property;

pub const RESOURCE_TYPE: &str = "oracle_user";

pub const USERS_QUERY: &str =
    "select username, default_tablespace, temporary_tablespace from dba_users";

/// A database user, titled `sid/username`.
///
/// `password`, `grants` and `quotas` are applied on creation only and are never compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleUserSpec {
    pub title: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub default_tablespace: Option<String>,
    #[serde(default)]
    pub temporary_tablespace: Option<String>,
    #[serde(default)]
    pub grants: Vec<String>,
    #[serde(default)]
    pub quotas: Vec<Quota>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Quota {
    pub tablespace: String,
    /// A size such as `100M`, or `unlimited`.
    pub size: String,
}

impl OracleUserSpec {
    fn context(&self, settings: &Settings) -> Result<ExecutionContext, ProvisionError> {
        Ok(ExecutionContext::new(
            target_sid(&self.title, self.sid.as_deref(), settings)?,
            settings.command_timeout(),
        ))
    }

    fn tablespace_clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();
        if let Some(ts) = &self.default_tablespace {
            clauses.push(format!("default tablespace {}", ts));
        }
        if let Some(ts) = &self.temporary_tablespace {
            clauses.push(format!("temporary tablespace {}", ts));
        }
        clauses
    }

    pub fn create_statement(&self) -> Result<String, ProvisionError> {
        let name = self.identity()?;
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| ProvisionError::invalid(&self.title, "password is required to create a user"))?;

        let mut parts = vec![format!("create user {} identified by \"{}\"", name, password)];
        parts.extend(self.tablespace_clauses());
        parts.extend(
            self.quotas
                .iter()
                .map(|q| format!("quota {} on {}", q.size, q.tablespace)),
        );
        Ok(parts.join(" "))
    }
}

impl ManagedResource for OracleUserSpec {
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
        vec![
            Property::text("default_tablespace", self.default_tablespace.as_ref(), "DEFAULT_TABLESPACE"),
            Property::text(
                "temporary_tablespace",
                self.temporary_tablespace.as_ref(),
                "TEMPORARY_TABLESPACE",
            ),
        ]
    }

    fn discovery(&self, settings: &Settings) -> Result<DiscoveryRequest, ProvisionError> {
        let sid = target_sid(&self.title, self.sid.as_deref(), settings)?;
        Ok(DiscoveryRequest::sql_on(sid, USERS_QUERY))
    }

    fn matches(&self, record: &RawStateRecord, settings: &Settings) -> Result<bool, ProvisionError> {
        let sid = target_sid(&self.title, self.sid.as_deref(), settings)?;
        Ok(record_is(record, "USERNAME", &self.identity()?, &sid))
    }

    fn on_create(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let name = self.identity()?;
        let context = self.context(&ctx.services.settings)?;
        builder.add(Command::Sql(self.create_statement()?), context.clone());
        for grant in &self.grants {
            builder.add(
                Command::Sql(format!("grant {} to {}", grant, name)),
                context.clone(),
            );
        }
        Ok(())
    }

    fn on_modify(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        let drifted = |path: &str| ctx.drift.iter().any(|d| d.is_under(path));
        let mut clauses = Vec::new();
        if let Some(ts) = self.default_tablespace.as_ref().filter(|_| drifted("default_tablespace")) {
            clauses.push(format!("default tablespace {}", ts));
        }
        if let Some(ts) = self.temporary_tablespace.as_ref().filter(|_| drifted("temporary_tablespace")) {
            clauses.push(format!("temporary tablespace {}", ts));
        }
        if clauses.is_empty() {
            return Ok(());
        }
        builder.add(
            Command::Sql(format!("alter user {} {}", self.identity()?, clauses.join(" "))),
            self.context(&ctx.services.settings)?,
        );
        Ok(())
    }

    fn on_destroy(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError> {
        builder.add(
            Command::Sql(format!("drop user {} cascade", self.identity()?)),
            self.context(&ctx.services.settings)?,
        );
        Ok(())
    }
}
