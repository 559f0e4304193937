pub mod database;
pub mod init_param;
pub mod oracle_service;
pub mod oracle_user;
pub mod tablespace;

use serde::Deserialize;
use serde_yaml::Value;

use crate::command::CommandBuilder;
use crate::config::types::{Ensure, Settings};
use crate::discovery::{RawStateRecord, Statement};
use crate::error::ProvisionError;
use crate::identity::{IdentityKey, TitleRule};
use crate::planner::reconcile::{Property, PropertyDrift};
use crate::provision::Provisioning;

pub use database::DatabaseSpec;
pub use init_param::InitParamSpec;
pub use oracle_service::OracleServiceSpec;
pub use oracle_user::OracleUserSpec;
pub use tablespace::TablespaceSpec;

/// Which state source serves a discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// SQL against running instances.
    Database,
    /// The host-local instance registry.
    HostRegistry,
}

/// The nodes a discovery request targets, before they are resolved against the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeRequest {
    /// Every instance registered on this host.
    AllSids,
    Sid(String),
    /// The host itself.
    Host,
}

/// How to fetch the raw records a declaration is matched against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryRequest {
    pub source: SourceKind,
    pub statement: Statement,
    pub scope: ScopeRequest,
}

impl DiscoveryRequest {
    pub fn sql_on(sid: impl Into<String>, statement: &str) -> Self {
        Self {
            source: SourceKind::Database,
            statement: Statement::new(statement),
            scope: ScopeRequest::Sid(sid.into()),
        }
    }

    pub fn sql_on_all_sids(statement: &str) -> Self {
        Self {
            source: SourceKind::Database,
            statement: Statement::new(statement),
            scope: ScopeRequest::AllSids,
        }
    }
}

/// What a lifecycle hook sees besides the command builder.
pub struct HookContext<'a> {
    pub services: &'a Provisioning,
    /// The record matched to the declaration, if any.
    pub found: Option<&'a RawStateRecord>,
    /// Every record the declaration's discovery request returned.
    pub peers: &'a [RawStateRecord],
    /// Declared properties that differ from `found`.
    pub drift: &'a [PropertyDrift],
}

/// A declared resource kind: its identity, compared properties, discovery and lifecycle hooks.
pub trait ManagedResource: Send + Sync {
    fn resource_type(&self) -> &'static str;

    fn title(&self) -> &str;

    fn ensure(&self) -> Ensure;

    fn title_rule(&self) -> TitleRule;

    fn identity(&self) -> Result<IdentityKey, ProvisionError> {
        self.title_rule().derive_key(self.title())
    }

    /// Compared properties with their desired values. Unset properties are not compared.
    fn properties(&self) -> Vec<Property>;

    /// The "fetch raw resources" hook.
    fn discovery(&self, settings: &Settings) -> Result<DiscoveryRequest, ProvisionError>;

    /// Whether `record` describes this declaration's resource.
    fn matches(&self, record: &RawStateRecord, settings: &Settings) -> Result<bool, ProvisionError>;

    fn on_create(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError>;

    fn on_modify(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError>;

    fn on_destroy(&self, builder: &mut CommandBuilder, ctx: &HookContext<'_>) -> Result<(), ProvisionError>;

    /// `<type>.<title>`, used in output and lock names.
    fn address(&self) -> String {
        format!("{}.{}", self.resource_type(), self.title())
    }
}

/// The instance a SQL-object declaration targets: the `sid/` title prefix, an explicit `sid`
/// field, or the configured default, in that order.
pub(crate) fn target_sid(
    title: &str,
    explicit: Option<&str>,
    settings: &Settings,
) -> Result<String, ProvisionError> {
    TitleRule::sid_qualified()
        .derive_sid(title)
        .or_else(|| explicit.map(|s| s.to_string()))
        .or_else(|| settings.default_sid.clone())
        .ok_or_else(|| {
            ProvisionError::invalid(
                title,
                "no sid: use a 'sid/name' title, a 'sid' field or settings.default_sid",
            )
        })
}

/// Whether `record` came from `sid` and its `column` equals the declaration's key.
pub(crate) fn record_is(
    record: &RawStateRecord,
    column: &str,
    key: &IdentityKey,
    sid: &str,
) -> bool {
    let same_sid = record.sid().is_some_and(|s| s.eq_ignore_ascii_case(sid));
    let same_key = record.column_data(column).is_some_and(|v| key.matches(v));
    same_sid && same_key
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

/// The request listing every resource of `resource_type`, on `sid` where the kind needs one.
pub fn listing(
    resource_type: &str,
    sid: Option<&str>,
    settings: &Settings,
) -> Result<DiscoveryRequest, ProvisionError> {
    let require_sid = || {
        sid.map(|s| s.to_string())
            .or_else(|| settings.default_sid.clone())
            .ok_or_else(|| ProvisionError::invalid(resource_type, "--sid or settings.default_sid is required"))
    };
    let request = match resource_type {
        database::RESOURCE_TYPE => DiscoveryRequest {
            source: SourceKind::HostRegistry,
            statement: Statement::new(database::REGISTRY_LISTING),
            scope: ScopeRequest::Host,
        },
        init_param::RESOURCE_TYPE => match sid {
            Some(_) => DiscoveryRequest::sql_on(require_sid()?, init_param::PARAMETERS_QUERY),
            None => DiscoveryRequest::sql_on_all_sids(init_param::PARAMETERS_QUERY),
        },
        tablespace::RESOURCE_TYPE => DiscoveryRequest::sql_on(require_sid()?, tablespace::TABLESPACES_QUERY),
        oracle_user::RESOURCE_TYPE => DiscoveryRequest::sql_on(require_sid()?, oracle_user::USERS_QUERY),
        oracle_service::RESOURCE_TYPE => {
            DiscoveryRequest::sql_on(require_sid()?, oracle_service::SERVICES_QUERY)
        }
        other => {
            return Err(ProvisionError::invalid(
                other,
                format!("unknown resource type (expected one of: {})", RESOURCE_TYPES.join(", ")),
            ))
        }
    };
    Ok(request)
}

/// One entry of the manifest's `resources` list.
#[derive(Debug, Clone)]
pub enum Declaration {
    Database(DatabaseSpec),
    InitParam(InitParamSpec),
    Tablespace(TablespaceSpec),
    OracleUser(OracleUserSpec),
    OracleService(OracleServiceSpec),
}

pub const RESOURCE_TYPES: [&str; 5] = [
    database::RESOURCE_TYPE,
    init_param::RESOURCE_TYPE,
    tablespace::RESOURCE_TYPE,
    oracle_user::RESOURCE_TYPE,
    oracle_service::RESOURCE_TYPE,
];

impl Declaration {
    /// Parse one `type:`-tagged mapping into its typed declaration.
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        let mut map = match value {
            Value::Mapping(map) => map,
            other => anyhow::bail!("resource must be a mapping, found {:?}", other),
        };
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => anyhow::bail!("resource 'type' must be a string"),
            None => anyhow::bail!("resource is missing 'type'"),
        };
        let body = Value::Mapping(map);
        let declaration = match kind.as_str() {
            database::RESOURCE_TYPE => Declaration::Database(parse(&kind, body)?),
            init_param::RESOURCE_TYPE => Declaration::InitParam(parse(&kind, body)?),
            tablespace::RESOURCE_TYPE => Declaration::Tablespace(parse(&kind, body)?),
            oracle_user::RESOURCE_TYPE => Declaration::OracleUser(parse(&kind, body)?),
            oracle_service::RESOURCE_TYPE => Declaration::OracleService(parse(&kind, body)?),
            other => anyhow::bail!(
                "unknown resource type '{}' (expected one of: {})",
                other,
                RESOURCE_TYPES.join(", ")
            ),
        };
        Ok(declaration)
    }

    pub fn resource(&self) -> &dyn ManagedResource {
        match self {
            Declaration::Database(r) => r,
            Declaration::InitParam(r) => r,
            Declaration::Tablespace(r) => r,
            Declaration::OracleUser(r) => r,
            Declaration::OracleService(r) => r,
        }
    }

    /// Override the declared presence (used by `destroy`).
    pub fn set_ensure(&mut self, ensure: Ensure) {
        match self {
            Declaration::Database(r) => r.ensure = ensure,
            Declaration::InitParam(r) => r.ensure = ensure,
            Declaration::Tablespace(r) => r.ensure = ensure,
            Declaration::OracleUser(r) => r.ensure = ensure,
            Declaration::OracleService(r) => r.ensure = ensure,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: &str, body: Value) -> anyhow::Result<T> {
    serde_yaml::from_value(body).map_err(|e| anyhow::anyhow!("invalid {} resource: {}", kind, e))
}
