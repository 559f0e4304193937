use anyhow::Result;
use std::collections::HashSet;

use super::types::{Ensure, Manifest, Settings};
use crate::error::ProvisionError;
use crate::resources::{Declaration, ScopeRequest};

/// Validate a loaded manifest for correctness.
pub fn validate(manifest: &Manifest) -> Result<()> {
    validate_identities(manifest)?;
    for declaration in &manifest.resources {
        validate_declaration(declaration, &manifest.settings)?;
    }
    Ok(())
}

/// Ensure every title yields an identity and no identity is declared twice for the same target.
fn validate_identities(manifest: &Manifest) -> Result<()> {
    let mut seen: HashSet<(&'static str, String, String)> = HashSet::new();
    for declaration in &manifest.resources {
        let resource = declaration.resource();
        let identity = resource.identity()?;
        let target = match resource.discovery(&manifest.settings)?.scope {
            ScopeRequest::Sid(sid) => sid.to_uppercase(),
            ScopeRequest::AllSids | ScopeRequest::Host => sid_of(declaration, &manifest.settings),
        };
        let key = (resource.resource_type(), target, identity.as_str().to_uppercase());
        if !seen.insert(key) {
            return Err(ProvisionError::invalid(
                &resource.address(),
                format!("identity '{}' is declared more than once", identity),
            )
            .into());
        }
    }
    Ok(())
}

fn sid_of(declaration: &Declaration, settings: &Settings) -> String {
    match declaration {
        Declaration::InitParam(p) => {
            crate::resources::target_sid(&p.title, p.sid.as_deref(), settings)
                .map(|s| s.to_uppercase())
                .unwrap_or_default()
        }
        _ => String::new(),
    }
}

fn validate_declaration(declaration: &Declaration, settings: &Settings) -> Result<()> {
    let resource = declaration.resource();
    let address = resource.address();
    let present = resource.ensure() == Ensure::Present;

    match declaration {
        Declaration::Database(db) => {
            if present && (db.sys_password.is_none() || db.system_password.is_none()) {
                return Err(ProvisionError::invalid(
                    &address,
                    "sys_password and system_password are required",
                )
                .into());
            }
            for (instance, node) in &db.instances {
                if instance.trim().is_empty() || node.trim().is_empty() {
                    return Err(ProvisionError::invalid(
                        &address,
                        format!("instance '{}' must name a node", instance),
                    )
                    .into());
                }
            }
            if db.oracle_home.trim().is_empty() || db.oracle_base.trim().is_empty() {
                return Err(ProvisionError::invalid(
                    &address,
                    "oracle_home and oracle_base must not be empty",
                )
                .into());
            }
        }
        Declaration::InitParam(param) => {
            crate::resources::target_sid(&param.title, param.sid.as_deref(), settings)?;
            if present && param.value.is_none() {
                return Err(ProvisionError::invalid(&address, "value is required").into());
            }
        }
        Declaration::OracleUser(user) => {
            if present && user.password.is_none() {
                return Err(ProvisionError::invalid(&address, "password is required").into());
            }
        }
        Declaration::Tablespace(_) | Declaration::OracleService(_) => {}
    }
    Ok(())
}
