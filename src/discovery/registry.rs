use std::sync::Arc;

use async_trait::async_trait;

use super::{RawStateRecord, StateSource, Statement};
use crate::provision::oratab::HostRegistry;

/// Node name used for host registry discovery.
pub const LOCAL_HOST: &str = "localhost";

/// Serves database discovery from the host registry: one record per registered instance.
pub struct OraTabSource {
    registry: Arc<dyn HostRegistry>,
}

impl OraTabSource {
    pub fn new(registry: Arc<dyn HostRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StateSource for OraTabSource {
    async fn query(&self, _node: &str, _statement: &Statement) -> anyhow::Result<Vec<RawStateRecord>> {
        Ok(self
            .registry
            .entries()?
            .into_iter()
            .map(|entry| {
                RawStateRecord::new()
                    .with("NAME", entry.sid)
                    .with("HOME", entry.home)
                    .with("AUTOSTART", if entry.autostart { "Y" } else { "N" })
            })
            .collect())
    }
}
