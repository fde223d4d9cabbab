use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::{connect, load_definitions};
use crate::core::assets::deploy_and_resolve;
use crate::core::dispatch::Dispatcher;
use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::settings::Settings;
use crate::core::terminal::{print_step, print_success};

async fn read_params(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Object(Default::default()));
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read params {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid params file {}", path.display()))
}

/// Runs one integration's operation outside of a batch and prints its output.
pub async fn run_invoke(
    settings: &Settings,
    integration_id: &str,
    params_path: Option<&Path>,
) -> Result<()> {
    let params = read_params(params_path).await?;
    let registry = Arc::new(IntegrationRegistry::load());
    let config = IntegrationConfig::load(&settings.integrations_path()).await?;
    let definitions = load_definitions(settings).await?;

    let connection = connect(settings).await?;
    let assets = deploy_and_resolve(&connection, &definitions).await?;

    print_step(&format!("Invoking {}", integration_id));
    let output = Dispatcher::new(registry)
        .run_operation(Some(&connection), &assets, &config, integration_id, params)
        .await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    print_success("Done");
    Ok(())
}
