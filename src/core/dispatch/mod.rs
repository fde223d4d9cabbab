//! Runs a batch of action items across every registered integration.
//!
//! Integrations are visited one at a time in registry order. Each one ends
//! the batch with exactly one terminal update (success, error or skipped),
//! and a remote failure on one integration never stops the ones after it.

pub mod types;

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::assets::AssetMap;
use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::substrate::{Connection, SubstrateError};

pub use types::{
    ActionItem, ExecutionSteps, OverallStatus, StepStatus, StepTransition, StepUpdate,
    group_by_target,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("Not connected to the execution substrate")]
    NotConnected,
    #[error("Unknown integration '{0}'")]
    UnknownIntegration(String),
    #[error("Operation '{0}' is not available on this connection")]
    OperationUnavailable(String),
    #[error(transparent)]
    Remote(#[from] SubstrateError),
}

pub struct Dispatcher {
    registry: Arc<IntegrationRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<IntegrationRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatches `batch`, reporting every status change on `updates`.
    ///
    /// Fails only when there is no connection, before any update is sent.
    /// Per-integration problems are reported as `skipped` or `error` steps.
    pub async fn execute(
        &self,
        connection: Option<&Connection>,
        assets: &AssetMap,
        batch: &[ActionItem],
        config: &IntegrationConfig,
        updates: &mpsc::UnboundedSender<StepUpdate>,
    ) -> Result<(), DispatchError> {
        let connection = connection.ok_or(DispatchError::NotConnected)?;
        let batch_id = Uuid::new_v4();
        let groups: HashMap<&str, Vec<&ActionItem>> = group_by_target(batch)
            .into_iter()
            .map(|g| (g.target, g.items))
            .collect();

        info!(
            "Dispatching batch {} ({} item(s)) on connection {}",
            batch_id,
            batch.len(),
            connection.id()
        );

        for descriptor in self.registry.iter() {
            let items = groups
                .get(descriptor.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let asset_id = assets.get(&descriptor.operation);

            let eligible = descriptor.is_configured(config) && !items.is_empty();
            let Some(asset_id) = asset_id.filter(|_| eligible) else {
                debug!(
                    "[{}] skipping {}: configured={}, items={}, resolved={}",
                    batch_id,
                    descriptor.id,
                    descriptor.is_configured(config),
                    items.len(),
                    asset_id.is_some()
                );
                emit(updates, &descriptor.id, StepTransition::Skipped);
                continue;
            };

            emit(updates, &descriptor.id, StepTransition::Running);
            let input = json!({
                "actions": items,
                "config": descriptor.config_payload(config),
            });

            match connection.substrate().invoke(asset_id, input).await {
                Ok(result) => {
                    info!("[{}] {} succeeded", batch_id, descriptor.id);
                    emit(updates, &descriptor.id, StepTransition::Success(result));
                }
                Err(e) => {
                    warn!("[{}] {} failed: {}", batch_id, descriptor.id, e);
                    emit(updates, &descriptor.id, StepTransition::Error(e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Invokes the operation behind one integration outside of a batch, e.g.
    /// fetching a meeting transcript. `params` is sent alongside the
    /// integration's configured fields.
    pub async fn run_operation(
        &self,
        connection: Option<&Connection>,
        assets: &AssetMap,
        config: &IntegrationConfig,
        integration_id: &str,
        params: Value,
    ) -> Result<Value, DispatchError> {
        let connection = connection.ok_or(DispatchError::NotConnected)?;
        let descriptor = self
            .registry
            .get(integration_id)
            .ok_or_else(|| DispatchError::UnknownIntegration(integration_id.to_string()))?;
        let asset_id = assets
            .get(&descriptor.operation)
            .ok_or_else(|| DispatchError::OperationUnavailable(descriptor.operation.clone()))?;

        let input = json!({
            "params": params,
            "config": descriptor.config_payload(config),
        });
        debug!("Invoking {} for {}", descriptor.operation, integration_id);
        Ok(connection.substrate().invoke(asset_id, input).await?)
    }
}

fn emit(updates: &mpsc::UnboundedSender<StepUpdate>, id: &str, transition: StepTransition) {
    let update = StepUpdate {
        id: id.to_string(),
        transition,
    };
    // A caller that stopped listening does not stop the batch.
    if updates.send(update).is_err() {
        debug!("Step update for {} dropped, receiver closed", id);
    }
}

#[cfg(test)]
mod tests;
