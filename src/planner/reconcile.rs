use std::fmt;

use serde::Serialize;

use crate::config::types::Ensure;
use crate::discovery::RawStateRecord;
use crate::resources::ManagedResource;

/// What a reconciliation pass decided to do with one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Modify,
    Destroy,
    NoOp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "+"),
            Action::Modify => write!(f, "~"),
            Action::Destroy => write!(f, "-"),
            Action::NoOp => write!(f, "(no changes)"),
        }
    }
}

/// Lifecycle of a managed resource across one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Provisioning,
    Present,
    Modifying,
    Decommissioning,
}

impl LifecycleState {
    pub fn observed(found: bool) -> Self {
        if found {
            LifecycleState::Present
        } else {
            LifecycleState::Absent
        }
    }

    /// The in-flight state `action` moves this state into, if the transition is legal.
    pub fn transition(self, action: Action) -> Option<Self> {
        match (self, action) {
            (LifecycleState::Absent, Action::Create) => Some(LifecycleState::Provisioning),
            (LifecycleState::Present, Action::Destroy) => Some(LifecycleState::Decommissioning),
            (LifecycleState::Present, Action::Modify) => Some(LifecycleState::Modifying),
            _ => None,
        }
    }

    pub fn finish(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (LifecycleState::Provisioning, true) => LifecycleState::Present,
            (LifecycleState::Provisioning, false) => LifecycleState::Absent,
            (LifecycleState::Decommissioning, true) => LifecycleState::Absent,
            (LifecycleState::Decommissioning, false) => LifecycleState::Present,
            (LifecycleState::Modifying, _) => LifecycleState::Present,
            (settled, _) => settled,
        }
    }
}

/// How values of a property are normalized before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    /// Byte sizes written as `100M`, `2G`, `unlimited` or plain byte counts.
    Size,
    /// yes/no style flags.
    Flag,
}

/// Where a property's current value comes from in a raw record.
#[derive(Clone, Copy)]
pub enum Source {
    Column(&'static str),
    Derived(fn(&RawStateRecord) -> Option<String>),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Column(c) => write!(f, "Column({})", c),
            Source::Derived(_) => write!(f, "Derived"),
        }
    }
}

impl Source {
    fn read(&self, record: &RawStateRecord) -> Option<String> {
        match self {
            Source::Column(column) => record.column_data(column).map(|s| s.to_string()),
            Source::Derived(f) => f(record),
        }
    }
}

/// A declared property: a compared leaf or a nested group of properties.
#[derive(Debug, Clone)]
pub enum Property {
    Leaf {
        name: &'static str,
        desired: Option<String>,
        kind: ValueKind,
        source: Source,
    },
    Group {
        name: &'static str,
        members: Vec<Property>,
    },
}

impl Property {
    pub fn text<T: ToString>(name: &'static str, desired: Option<T>, column: &'static str) -> Self {
        Self::leaf(name, desired, ValueKind::Text, Source::Column(column))
    }

    pub fn size<T: ToString>(name: &'static str, desired: Option<T>, column: &'static str) -> Self {
        Self::leaf(name, desired, ValueKind::Size, Source::Column(column))
    }

    pub fn flag<T: ToString>(name: &'static str, desired: Option<T>, column: &'static str) -> Self {
        Self::leaf(name, desired, ValueKind::Flag, Source::Column(column))
    }

    pub fn leaf<T: ToString>(
        name: &'static str,
        desired: Option<T>,
        kind: ValueKind,
        source: Source,
    ) -> Self {
        Property::Leaf {
            name,
            desired: desired.map(|d| d.to_string()),
            kind,
            source,
        }
    }

    pub fn group(name: &'static str, members: Vec<Property>) -> Self {
        Property::Group { name, members }
    }
}

/// A declared property whose current value differs from the desired one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyDrift {
    /// Dotted path through nested groups, e.g. `datafile.size`.
    pub path: String,
    pub desired: String,
    pub actual: Option<String>,
}

impl PropertyDrift {
    /// Whether this drift concerns `path` or a property nested beneath it.
    pub fn is_under(&self, path: &str) -> bool {
        self.path == path || self.path.starts_with(&format!("{}.", path))
    }
}

/// Compare every declared property against `record`. Undeclared properties are skipped.
pub fn diff(properties: &[Property], record: &RawStateRecord) -> Vec<PropertyDrift> {
    let mut drifts = Vec::new();
    for property in properties {
        collect_drift(property, record, "", &mut drifts);
    }
    drifts
}

fn collect_drift(
    property: &Property,
    record: &RawStateRecord,
    prefix: &str,
    drifts: &mut Vec<PropertyDrift>,
) {
    match property {
        Property::Leaf {
            name,
            desired: Some(desired),
            kind,
            source,
        } => {
            let actual = source.read(record);
            let same = actual
                .as_deref()
                .is_some_and(|actual| values_match(*kind, desired, actual));
            if !same {
                drifts.push(PropertyDrift {
                    path: join_path(prefix, name),
                    desired: desired.clone(),
                    actual,
                });
            }
        }
        Property::Leaf { desired: None, .. } => {}
        Property::Group { name, members } => {
            let path = join_path(prefix, name);
            for member in members {
                collect_drift(member, record, &path, drifts);
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Decide the action for one declaration given the record discovered for it, if any.
pub fn reconcile(resource: &dyn ManagedResource, found: Option<&RawStateRecord>) -> Action {
    match (found, resource.ensure()) {
        (None, Ensure::Present) => Action::Create,
        (None, Ensure::Absent) => Action::NoOp,
        (Some(_), Ensure::Absent) => Action::Destroy,
        (Some(record), Ensure::Present) => {
            if diff(&resource.properties(), record).is_empty() {
                Action::NoOp
            } else {
                Action::Modify
            }
        }
    }
}

/// Largest datafile size Oracle reports for `maxsize unlimited` on a smallfile tablespace.
const UNLIMITED_MAXBYTES: u64 = 34_359_721_984;

fn values_match(kind: ValueKind, desired: &str, actual: &str) -> bool {
    let desired = normalize(kind, desired);
    let actual = normalize(kind, actual);
    if desired == actual {
        return true;
    }
    kind == ValueKind::Size
        && desired == "UNLIMITED"
        && actual.parse::<u64>().is_ok_and(|bytes| bytes >= UNLIMITED_MAXBYTES)
}

/// Bring a value into the canonical form used for comparison.
pub fn normalize(kind: ValueKind, value: &str) -> String {
    let value = value.trim().to_uppercase();
    match kind {
        ValueKind::Text => value,
        ValueKind::Flag => match value.as_str() {
            "YES" | "Y" | "TRUE" | "ON" => "YES".to_string(),
            "NO" | "N" | "FALSE" | "OFF" => "NO".to_string(),
            _ => value,
        },
        ValueKind::Size => size_in_bytes(&value)
            .map(|b| b.to_string())
            .unwrap_or(value),
    }
}

/// Parse `10`, `10K`, `10M`, `10G`, `10T` (optionally suffixed with `B`) into bytes.
pub fn size_in_bytes(value: &str) -> Option<u64> {
    let value = value.trim().to_uppercase();
    let value = value.strip_suffix('B').unwrap_or(&value);
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let number: u64 = digits.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        _ => return None,
    };
    number.checked_mul(multiplier)
}
