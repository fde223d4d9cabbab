//! Deploys logical operations to the substrate and resolves their names to
//! invocation ids, once per connection.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::core::substrate::{Connection, OperationDefinition, RemoteOperation};

/// Name prefix owned by this application on the substrate.
pub const NAMESPACE: &str = "pm:";

/// Logical operation name to opaque substrate id. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssetMap(BTreeMap<String, String>);

impl AssetMap {
    /// Keeps inventory entries inside `namespace`, minus `excluded` names.
    /// When the inventory lists a name twice the later entry wins.
    pub fn from_inventory(
        inventory: &[RemoteOperation],
        namespace: &str,
        excluded: &HashSet<String>,
    ) -> Self {
        let entries = inventory
            .iter()
            .filter(|op| op.name.starts_with(namespace) && !excluded.contains(&op.name))
            .map(|op| (op.name.clone(), op.id.clone()))
            .collect();
        Self(entries)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for AssetMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Deploys every definition and builds the resolved map. Only the first
/// successful call per connection does any remote work; later calls return
/// the cached map. Conflicts count as success. Other per-definition failures
/// are logged and that name is left out of the map.
pub async fn deploy_and_resolve(
    connection: &Connection,
    definitions: &[OperationDefinition],
) -> Result<AssetMap> {
    if connection.is_deployed() {
        debug!(
            "Connection {} already deployed, reusing resolved assets",
            connection.id()
        );
    }
    let assets = connection
        .assets
        .get_or_try_init(|| deploy_pass(connection, definitions))
        .await?;
    Ok(assets.clone())
}

async fn deploy_pass(
    connection: &Connection,
    definitions: &[OperationDefinition],
) -> Result<AssetMap> {
    let substrate = connection.substrate();
    let mut failed = HashSet::new();

    for definition in definitions {
        match substrate.deploy(definition).await {
            Ok(()) => debug!("Deployed operation {}", definition.name),
            Err(e) if e.is_conflict() => {
                debug!("Operation {} already deployed", definition.name)
            }
            Err(e) => {
                warn!("Failed to deploy operation {}: {}", definition.name, e);
                failed.insert(definition.name.clone());
            }
        }
    }

    let inventory = substrate
        .list_operations()
        .await
        .context("Failed to list substrate operations")?;
    let assets = AssetMap::from_inventory(&inventory, NAMESPACE, &failed);

    info!(
        "Resolved {} operation(s) on connection {} ({} failed to deploy)",
        assets.len(),
        connection.id(),
        failed.len()
    );
    Ok(assets)
}
