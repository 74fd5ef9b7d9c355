use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const ID_LEN: usize = 8;

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

/// Identifies one helper agent. Fresh for every target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        Self(short_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tags every helper agent created by one invocation. Constant for the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSuffix(String);

impl LabelSuffix {
    pub fn generate() -> Self {
        Self(short_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LabelSuffix {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LabelSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const AGENT_LABEL: &str = "name";
pub const BATCH_LABEL: &str = "app";

pub fn helper_name(experiment: &str, id: &str) -> String {
    format!("{}-helper-{}", experiment, id)
}

/// Label equality query addressing either one helper agent or a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    key: String,
    value: String,
}

impl Selector {
    pub fn per_agent(experiment: &str, run_id: &RunId) -> Self {
        Self {
            key: AGENT_LABEL.to_string(),
            value: helper_name(experiment, run_id.as_str()),
        }
    }

    pub fn per_batch(experiment: &str, suffix: &LabelSuffix) -> Self {
        Self {
            key: BATCH_LABEL.to_string(),
            value: helper_name(experiment, suffix.as_str()),
        }
    }

    /// Parses `key=value`; anything else is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let (key, value) = s.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(&self.key).map(|v| v == &self.value).unwrap_or(false)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
