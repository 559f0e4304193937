use std::collections::BTreeMap;

/// Whether a database runs as one standalone instance or as a cluster of instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Standalone,
    /// Instance name → node name, ordered by instance name.
    Clustered(BTreeMap<String, String>),
}

impl Topology {
    pub fn resolve(instances: &BTreeMap<String, String>) -> Self {
        if is_clustered(instances) {
            Topology::Clustered(instances.clone())
        } else {
            Topology::Standalone
        }
    }

    pub fn is_clustered(&self) -> bool {
        matches!(self, Topology::Clustered(_))
    }

    /// The instance this host runs: the first cluster instance, or the database itself.
    pub fn effective_instance_name(&self, name: &str) -> String {
        match self {
            Topology::Clustered(_) => format!("{}1", name),
            Topology::Standalone => name.to_string(),
        }
    }

    /// `(instance, node)` pairs in instance-name order. Empty when standalone.
    pub fn instances(&self) -> Vec<(&str, &str)> {
        match self {
            Topology::Clustered(instances) => instances
                .iter()
                .map(|(i, n)| (i.as_str(), n.as_str()))
                .collect(),
            Topology::Standalone => Vec::new(),
        }
    }

    /// Per-instance init parameters appended to the generated init file of a cluster.
    pub fn init_parameters(&self) -> String {
        let mut out = String::new();
        for (idx, (instance, _node)) in self.instances().into_iter().enumerate() {
            let number = idx + 1;
            out.push_str("#\n");
            out.push_str("# Cluster instance parameters\n");
            out.push_str("#\n");
            out.push_str(&format!("{}.instance_number={}\n", instance, number));
            out.push_str(&format!("{}.thread={}\n", instance, number));
            out.push_str(&format!("{}.undo_tablespace=UNDOTBS{}\n", instance, number));
        }
        out
    }
}

pub fn is_clustered(instances: &BTreeMap<String, String>) -> bool {
    !instances.is_empty()
}
