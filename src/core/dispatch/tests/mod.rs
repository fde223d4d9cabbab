mod skipping;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::assets::{AssetMap, deploy_and_resolve};
use crate::core::dispatch::{ActionItem, Dispatcher, StepUpdate};
use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::substrate::Connection;
use crate::core::testing::{MockSubstrate, definition};

/// Two-integration registry: `alpha` and `beta`.
pub(super) fn small_registry() -> Arc<IntegrationRegistry> {
    let json = r#"{"integrations": [
        {"id": "alpha", "name": "Alpha", "category": "issue_tracker",
         "operation": "pm:executeAlphaActions", "server_field": "alphaUrl",
         "token_field": "alphaToken", "fields": ["alphaProject"]},
        {"id": "beta", "name": "Beta", "category": "chat",
         "operation": "pm:executeBetaActions", "server_field": "betaUrl",
         "token_field": "betaToken"}
    ]}"#;
    Arc::new(IntegrationRegistry::from_json(json).unwrap())
}

/// Connection with every registry operation deployed.
pub(super) async fn connected(
    registry: &IntegrationRegistry,
) -> (Arc<MockSubstrate>, Connection, AssetMap) {
    let substrate = Arc::new(MockSubstrate::new());
    let conn = Connection::new(substrate.clone());
    let defs: Vec<_> = registry.iter().map(|d| definition(&d.operation)).collect();
    let assets = deploy_and_resolve(&conn, &defs).await.unwrap();
    (substrate, conn, assets)
}

/// Runs a batch and collects every update in emission order.
pub(super) async fn run(
    dispatcher: &Dispatcher,
    conn: &Connection,
    assets: &AssetMap,
    batch: &[ActionItem],
    config: &IntegrationConfig,
) -> Vec<StepUpdate> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher
        .execute(Some(conn), assets, batch, config, &tx)
        .await
        .unwrap();
    drop(tx);
    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    updates
}

pub(super) fn terminal_updates(updates: &[StepUpdate]) -> Vec<&StepUpdate> {
    updates
        .iter()
        .filter(|u| u.transition.status().is_terminal())
        .collect()
}
