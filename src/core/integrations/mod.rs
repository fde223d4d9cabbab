//! Static integration registry and the flat configuration snapshot it reads.
//!
//! The registry is an ordered list of descriptors. Order matters: the
//! dispatcher walks it front to back, and every descriptor id doubles as an
//! action-item routing target and a health-map key.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

const INTEGRATIONS_JSON: &str = include_str!("integrations.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationDescriptor {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Logical operation invoked for this integration's actions.
    pub operation: String,
    /// Configuration key holding the endpoint URL. Any non-empty value means
    /// configured.
    pub server_field: String,
    pub token_field: String,
    /// Auxiliary configuration keys passed through to the remote call.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl IntegrationDescriptor {
    pub fn endpoint<'a>(&self, config: &'a IntegrationConfig) -> &'a str {
        config.get(&self.server_field)
    }

    pub fn is_configured(&self, config: &IntegrationConfig) -> bool {
        !self.endpoint(config).is_empty()
    }

    /// Every configuration key this integration owns, endpoint first.
    pub fn config_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.server_field.as_str())
            .chain(std::iter::once(self.token_field.as_str()))
            .chain(self.fields.iter().map(String::as_str))
    }

    /// Copies this integration's configured values verbatim into a JSON object.
    pub fn config_payload(&self, config: &IntegrationConfig) -> Map<String, Value> {
        self.config_keys()
            .map(|key| (key.to_string(), Value::String(config.get(key).to_string())))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRegistry {
    integrations: Vec<IntegrationDescriptor>,
}

impl IntegrationRegistry {
    /// The built-in registry embedded at compile time.
    pub fn load() -> Self {
        Self::from_json(INTEGRATIONS_JSON).expect("integrations.json is invalid")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let registry: IntegrationRegistry = serde_json::from_str(json)?;
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for descriptor in &self.integrations {
            if descriptor.id.trim().is_empty() {
                return Err(anyhow!("Integration with empty id in registry"));
            }
            if !seen.insert(descriptor.id.as_str()) {
                return Err(anyhow!("Duplicate integration id '{}'", descriptor.id));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntegrationDescriptor> {
        self.integrations.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn get(&self, id: &str) -> Option<&IntegrationDescriptor> {
        self.integrations.iter().find(|d| d.id == id)
    }

    /// Non-hidden integrations with an endpoint set, in registry order.
    /// These are the ones the health monitor probes.
    pub fn configured<'a>(
        &'a self,
        config: &'a IntegrationConfig,
    ) -> impl Iterator<Item = &'a IntegrationDescriptor> + 'a {
        self.integrations
            .iter()
            .filter(move |d| !d.hidden && d.is_configured(config))
    }
}

/// Flat key/value snapshot of every integration's settings. Empty string
/// means unset; a missing key reads the same as an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationConfig(BTreeMap<String, String>);

impl IntegrationConfig {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    #[cfg(test)]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Reads a flat JSON object. A missing file is an empty configuration.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "No integration config at {}, all integrations unset.",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Non-string scalars are stringified; nulls read as unset.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: Map<String, Value> = serde_json::from_str(content)
            .map_err(|e| anyhow!("Integration config must be a flat JSON object: {}", e))?;
        let mut values = BTreeMap::new();
        for (key, value) in raw {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                _ => return Err(anyhow!("Integration config key '{}' is not a scalar", key)),
            };
            values.insert(key, value);
        }
        Ok(Self(values))
    }
}
