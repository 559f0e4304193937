pub mod registry;
pub mod sqlplus;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProvisionError;

/// Column naming the node a record was read from.
pub const SID_COLUMN: &str = "SID";

/// One unparsed row of state for one discovered instance.
///
/// Column names are stored upper-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawStateRecord {
    columns: BTreeMap<String, String>,
}

impl RawStateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.columns.insert(column.to_uppercase(), value.into());
    }

    pub fn column_data(&self, column: &str) -> Option<&str> {
        self.columns.get(&column.to_uppercase()).map(|s| s.as_str())
    }

    pub fn sid(&self) -> Option<&str> {
        self.column_data(SID_COLUMN)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for RawStateRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut record = RawStateRecord::new();
        for (column, value) in iter {
            record.insert(&column, value);
        }
        record
    }
}

/// A read-only query understood by a state source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement(String);

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which nodes a discovery query runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    AllNodes(Vec<String>),
    SingleNode(String),
}

impl Scope {
    pub fn nodes(&self) -> Vec<&str> {
        match self {
            Scope::AllNodes(nodes) => nodes.iter().map(|n| n.as_str()).collect(),
            Scope::SingleNode(node) => vec![node.as_str()],
        }
    }
}

/// Something that can be queried for raw state on a named node.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn query(&self, node: &str, statement: &Statement) -> anyhow::Result<Vec<RawStateRecord>>;
}

/// A node that could not be queried during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: String,
    pub cause: String,
}

/// The records produced by one discovery call.
///
/// Iterating consumes the records; a new call to [`discover`] is needed to see fresh state.
#[derive(Debug)]
pub struct Discovered {
    records: std::vec::IntoIter<RawStateRecord>,
    failures: Vec<NodeFailure>,
}

impl Discovered {
    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }
}

impl Iterator for Discovered {
    type Item = RawStateRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// Run `statement` against every node in `scope` and gather the records.
///
/// Nodes are queried concurrently and joined before returning. Unreachable nodes are reported
/// on the result; discovery only fails when every node failed.
pub async fn discover(
    resource_type: &str,
    source: &dyn StateSource,
    statement: &Statement,
    scope: &Scope,
) -> Result<Discovered, ProvisionError> {
    let nodes = scope.nodes();
    let queries = nodes.iter().map(|node| async move {
        let result = source.query(node, statement).await;
        (node.to_string(), result)
    });
    let results = futures::future::join_all(queries).await;

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (node, result) in results {
        match result {
            Ok(rows) => {
                tracing::debug!(resource_type, node = node.as_str(), rows = rows.len(), "Discovered state");
                records.extend(rows.into_iter().map(|mut row| {
                    if row.sid().is_none() {
                        row.insert(SID_COLUMN, node.clone());
                    }
                    row
                }));
            }
            Err(e) => {
                tracing::warn!(resource_type, node = node.as_str(), error = %e, "Node unreachable during discovery");
                failures.push(NodeFailure {
                    node,
                    cause: crate::error::cause_text(&e),
                });
            }
        }
    }

    if !nodes.is_empty() && failures.len() == nodes.len() {
        let cause = failures
            .iter()
            .map(|f| format!("{}: {}", f.node, f.cause))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ProvisionError::DiscoveryUnavailable {
            resource_type: resource_type.to_string(),
            cause,
        });
    }

    Ok(Discovered {
        records: records.into_iter(),
        failures,
    })
}
