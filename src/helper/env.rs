use crate::types::{EnvSource, EnvVar};

/// Ordered environment payload for a helper container.
#[derive(Debug, Clone, Default)]
pub struct EnvBuilder {
    vars: Vec<EnvVar>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl ToString) -> Self {
        self.vars.push(EnvVar {
            name: name.to_string(),
            source: EnvSource::Value(value.to_string()),
        });
        self
    }

    /// Value injected by the platform from the agent's own metadata.
    pub fn set_field_ref(mut self, name: &str, api_version: &str, field_path: &str) -> Self {
        self.vars.push(EnvVar {
            name: name.to_string(),
            source: EnvSource::FieldRef {
                api_version: api_version.to_string(),
                field_path: field_path.to_string(),
            },
        });
        self
    }

    pub fn build(self) -> Vec<EnvVar> {
        self.vars
    }
}
