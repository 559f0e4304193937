use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::transport::{execute_plan, Transport};
use crate::command::{CommandBuilder, ProvisioningPlan};
use crate::discovery::{self, registry::LOCAL_HOST, RawStateRecord, Scope, StateSource};
use crate::error::{cause_text, ProvisionError};
use crate::planner::reconcile::{self, Action, LifecycleState, PropertyDrift};
use crate::provision::Provisioning;
use crate::resources::{Declaration, DiscoveryRequest, HookContext, ScopeRequest, SourceKind};
use crate::state::lock::FileLock;

/// A planned change for a single declaration.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub address: String,
    pub resource_type: &'static str,
    pub identity: String,
    pub action: Action,
    pub drift: Vec<PropertyDrift>,
    pub found: Option<RawStateRecord>,
    /// Every record the declaration's discovery returned.
    #[serde(skip)]
    pub peers: Vec<RawStateRecord>,
    /// Position of the declaration in the manifest.
    #[serde(skip)]
    pub index: usize,
}

/// Summary of a plan operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanSummary {
    pub changes: Vec<PlannedChange>,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub no_ops: usize,
}

impl PlanSummary {
    fn push(&mut self, change: PlannedChange) {
        match change.action {
            Action::Create => self.creates += 1,
            Action::Modify => self.updates += 1,
            Action::Destroy => self.deletes += 1,
            Action::NoOp => self.no_ops += 1,
        }
        self.changes.push(change);
    }

    pub fn has_changes(&self) -> bool {
        self.creates + self.updates + self.deletes > 0
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.creates > 0 {
            parts.push(format!("{} to add", self.creates));
        }
        if self.updates > 0 {
            parts.push(format!("{} to change", self.updates));
        }
        if self.deletes > 0 {
            parts.push(format!("{} to destroy", self.deletes));
        }
        if parts.is_empty() {
            write!(f, "No changes.")
        } else {
            write!(f, "Plan: {}.", parts.join(", "))
        }
    }
}

/// Outcome of applying one planned change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    Succeeded,
    Failed(String),
    /// Not attempted because an earlier resource failed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ResourceResult {
    pub address: String,
    pub action: Action,
    pub status: ResourceStatus,
    pub state: LifecycleState,
    pub plan: Option<ProvisioningPlan>,
}

/// Summary of an apply operation.
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub results: Vec<ResourceResult>,
    pub added: usize,
    pub changed: usize,
    pub destroyed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_secs: u64,
    pub is_destroy: bool,
}

impl ApplySummary {
    /// The first failed result, if any.
    pub fn first_failure(&self) -> Option<&ResourceResult> {
        self.results
            .iter()
            .find(|r| matches!(r.status, ResourceStatus::Failed(_)))
    }
}

impl std::fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = if self.is_destroy { "Destroy" } else { "Apply" };
        let time = format_elapsed(self.elapsed_secs);
        if self.is_destroy {
            write!(
                f,
                "{} complete! Resources: {} destroyed",
                action, self.destroyed,
            )?;
        } else {
            write!(
                f,
                "{} complete! Resources: {} added, {} changed, {} destroyed",
                action, self.added, self.changed, self.destroyed,
            )?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        write!(f, ". Total time: {}.", time)
    }
}

fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else {
        let mins = secs / 60;
        let remaining = secs % 60;
        if remaining == 0 {
            format!("{}m", mins)
        } else {
            format!("{}m{}s", mins, remaining)
        }
    }
}

/// The state sources discovery requests are served from.
#[derive(Clone)]
pub struct StateSources {
    pub database: Arc<dyn StateSource>,
    pub registry: Arc<dyn StateSource>,
}

impl StateSources {
    fn get(&self, kind: SourceKind) -> &dyn StateSource {
        match kind {
            SourceKind::Database => self.database.as_ref(),
            SourceKind::HostRegistry => self.registry.as_ref(),
        }
    }
}

/// Drives reconciliation: discover, diff, build plans and hand them to the transport.
///
/// Resources are processed one at a time, in manifest order.
pub struct ReconcileEngine {
    services: Provisioning,
    sources: StateSources,
    transport: Arc<dyn Transport>,
}

impl ReconcileEngine {
    pub fn new(services: Provisioning, sources: StateSources, transport: Arc<dyn Transport>) -> Self {
        Self {
            services,
            sources,
            transport,
        }
    }

    pub fn services(&self) -> &Provisioning {
        &self.services
    }

    fn resolve_scope(&self, resource_type: &str, scope: &ScopeRequest) -> Result<Scope, ProvisionError> {
        match scope {
            ScopeRequest::AllSids => {
                let entries = self.services.registry.entries().map_err(|e| {
                    ProvisionError::DiscoveryUnavailable {
                        resource_type: resource_type.to_string(),
                        cause: cause_text(&e),
                    }
                })?;
                Ok(Scope::AllNodes(entries.into_iter().map(|e| e.sid).collect()))
            }
            ScopeRequest::Sid(sid) => Ok(Scope::SingleNode(sid.clone())),
            ScopeRequest::Host => Ok(Scope::SingleNode(LOCAL_HOST.to_string())),
        }
    }

    /// Run one discovery request and collect its records.
    pub async fn discover(
        &self,
        resource_type: &str,
        request: &DiscoveryRequest,
    ) -> Result<Vec<RawStateRecord>, ProvisionError> {
        let scope = self.resolve_scope(resource_type, &request.scope)?;
        let discovered = discovery::discover(
            resource_type,
            self.sources.get(request.source),
            &request.statement,
            &scope,
        )
        .await?;
        if !discovered.failures().is_empty() {
            debug!(
                resource_type,
                unreachable = discovered.failures().len(),
                "Discovery completed with unreachable nodes"
            );
        }
        Ok(discovered.collect())
    }

    /// Decide the action for every declaration.
    ///
    /// Each distinct discovery request runs once per pass; nothing is kept between passes.
    pub async fn plan(&self, declarations: &[Declaration]) -> Result<PlanSummary, ProvisionError> {
        let settings = &self.services.settings;
        let mut memo: HashMap<DiscoveryRequest, Vec<RawStateRecord>> = HashMap::new();
        let mut summary = PlanSummary::default();

        for (index, declaration) in declarations.iter().enumerate() {
            let resource = declaration.resource();
            let identity = resource.identity()?;
            let request = resource.discovery(settings)?;

            if !memo.contains_key(&request) {
                let records = self.discover(resource.resource_type(), &request).await?;
                debug!(
                    resource_type = resource.resource_type(),
                    statement = %request.statement,
                    records = records.len(),
                    "Discovered raw state"
                );
                memo.insert(request.clone(), records);
            }
            let peers = memo.get(&request).cloned().unwrap_or_default();

            let mut found = None;
            for record in &peers {
                if resource.matches(record, settings)? {
                    found = Some(record.clone());
                    break;
                }
            }

            let action = reconcile::reconcile(resource, found.as_ref());
            let drift = match (&found, action) {
                (Some(record), Action::Modify) => reconcile::diff(&resource.properties(), record),
                _ => Vec::new(),
            };
            info!(
                resource = resource.address().as_str(),
                identity = identity.as_str(),
                action = ?action,
                drifted = drift.len(),
                "Reconciled"
            );

            summary.push(PlannedChange {
                address: resource.address(),
                resource_type: resource.resource_type(),
                identity: identity.to_string(),
                action,
                drift,
                found,
                peers,
                index,
            });
        }

        Ok(summary)
    }

    /// Build the provisioning plan for one change by running the matching lifecycle hook.
    pub fn build_plan(
        &self,
        declaration: &Declaration,
        change: &PlannedChange,
    ) -> Result<ProvisioningPlan, ProvisionError> {
        let resource = declaration.resource();
        let mut builder = CommandBuilder::new(change.address.as_str());
        let ctx = HookContext {
            services: &self.services,
            found: change.found.as_ref(),
            peers: &change.peers,
            drift: &change.drift,
        };
        match change.action {
            Action::Create => resource.on_create(&mut builder, &ctx)?,
            Action::Modify => resource.on_modify(&mut builder, &ctx)?,
            Action::Destroy => resource.on_destroy(&mut builder, &ctx)?,
            Action::NoOp => {}
        }
        Ok(builder.build())
    }

    async fn apply_change(
        &self,
        declaration: &Declaration,
        change: &PlannedChange,
    ) -> Result<ProvisioningPlan, ProvisionError> {
        let resource = declaration.resource();
        let _lock = FileLock::acquire(
            &self.services.settings.working_dir,
            resource.resource_type(),
            &change.identity,
        )
        .map_err(|e| ProvisionError::Locked {
            resource: change.address.clone(),
            cause: cause_text(&e),
        })?;

        let plan = self.build_plan(declaration, change)?;
        info!(
            resource = change.address.as_str(),
            immediate = plan.immediate().len(),
            deferred = plan.deferred().len(),
            "Built provisioning plan"
        );
        execute_plan(self.transport.as_ref(), &plan).await?;
        Ok(plan)
    }

    /// Carry out every change of `plan`, stopping at the first failure.
    pub async fn apply(
        &self,
        declarations: &[Declaration],
        plan: &PlanSummary,
        is_destroy: bool,
    ) -> ApplySummary {
        let start = Instant::now();
        let mut summary = ApplySummary {
            is_destroy,
            ..Default::default()
        };
        let mut halted = false;

        for change in plan.changes.iter().filter(|c| c.action != Action::NoOp) {
            let observed = LifecycleState::observed(change.found.is_some());
            let Some(in_flight) = observed.transition(change.action) else {
                continue;
            };

            if halted {
                summary.skipped += 1;
                summary.results.push(ResourceResult {
                    address: change.address.clone(),
                    action: change.action,
                    status: ResourceStatus::Skipped,
                    state: observed,
                    plan: None,
                });
                continue;
            }

            let Some(declaration) = declarations.get(change.index) else {
                continue;
            };

            info!(resource = change.address.as_str(), state = ?in_flight, "Applying");
            let (status, built) = match self.apply_change(declaration, change).await {
                Ok(built) => {
                    match change.action {
                        Action::Create => summary.added += 1,
                        Action::Modify => summary.changed += 1,
                        Action::Destroy => summary.destroyed += 1,
                        Action::NoOp => {}
                    }
                    (ResourceStatus::Succeeded, Some(built))
                }
                Err(e) => {
                    warn!(resource = change.address.as_str(), error = %e, "Apply failed");
                    summary.failed += 1;
                    halted = true;
                    (ResourceStatus::Failed(e.to_string()), None)
                }
            };

            let state = in_flight.finish(status == ResourceStatus::Succeeded);
            debug!(resource = change.address.as_str(), state = ?state, "Settled");
            summary.results.push(ResourceResult {
                address: change.address.clone(),
                action: change.action,
                status,
                state,
                plan: built,
            });
        }

        summary.elapsed_secs = start.elapsed().as_secs();
        summary
    }
}
