use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Selector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInstance {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl TargetInstance {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            node_name: node.into(),
            containers: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.containers.push(container.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_placed(&self) -> bool {
        !self.node_name.is_empty()
    }
}

/// Which instances to disrupt: explicit names win over the label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub namespace: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub label: Option<Selector>,
    #[serde(default)]
    pub affected_percent: u32,
}

impl TargetSpec {
    /// Splits a comma separated name list, dropping blanks.
    pub fn parse_names(list: &str) -> Vec<String> {
        list.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.label.is_none()
    }
}
