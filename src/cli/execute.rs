use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{connect, load_definitions};
use crate::core::assets::deploy_and_resolve;
use crate::core::dispatch::{
    ActionItem, Dispatcher, ExecutionSteps, OverallStatus, StepStatus, StepTransition,
};
use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::settings::Settings;
use crate::core::terminal::{
    print_error, print_info, print_running, print_skipped, print_status, print_step,
    print_success,
};

/// Accepts either a bare array of items or `{ "actions": [...] }`.
pub(crate) fn parse_batch(content: &str) -> Result<Vec<ActionItem>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum BatchFile {
        Items(Vec<ActionItem>),
        Wrapped { actions: Vec<ActionItem> },
    }
    let batch = match serde_json::from_str::<BatchFile>(content)? {
        BatchFile::Items(items) | BatchFile::Wrapped { actions: items } => items,
    };
    Ok(batch)
}

/// `id=status` for every step that was not skipped, in registry order.
fn dispatched_steps(steps: &ExecutionSteps) -> Vec<String> {
    steps
        .iter()
        .filter(|s| s.status != StepStatus::Skipped)
        .map(|s| format!("{}={}", s.id, s.status.as_str()))
        .collect()
}

pub async fn run_execute(settings: &Settings, batch_path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(batch_path)
        .await
        .with_context(|| format!("Failed to read batch {}", batch_path.display()))?;
    let batch = parse_batch(&content)
        .with_context(|| format!("Invalid batch file {}", batch_path.display()))?;

    let registry = Arc::new(IntegrationRegistry::load());
    let config = IntegrationConfig::load(&settings.integrations_path()).await?;
    let definitions = load_definitions(settings).await?;

    let connection = connect(settings).await?;
    let assets = deploy_and_resolve(&connection, &definitions).await?;
    let dispatcher = Dispatcher::new(registry.clone());

    print_step(&format!("Executing {} action item(s)", batch.len()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = async move {
        let outcome = dispatcher
            .execute(Some(&connection), &assets, &batch, &config, &tx)
            .await;
        // Closing the channel ends the report loop.
        drop(tx);
        outcome
    };
    let mut steps = ExecutionSteps::new(&registry);
    let report = async {
        while let Some(update) = rx.recv().await {
            steps.apply(&update);
            match &update.transition {
                StepTransition::Running => print_running(&update.id),
                StepTransition::Success(result) => print_status(&update.id, &result.to_string()),
                StepTransition::Error(message) => {
                    print_error(&format!("{}: {}", update.id, message))
                }
                StepTransition::Skipped => print_skipped(&update.id, "skipped"),
            }
        }
    };
    let (outcome, ()) = tokio::join!(run, report);
    outcome?;

    let dispatched = dispatched_steps(&steps);
    if dispatched.is_empty() {
        print_info("No integration had both an endpoint and matching items");
    } else {
        print_info(&format!("Dispatched: {}", dispatched.join(", ")));
    }

    match steps.overall() {
        OverallStatus::Success => {
            print_success("Batch completed");
            Ok(())
        }
        OverallStatus::Error => Err(anyhow!("One or more integrations failed")),
        OverallStatus::Running => Err(anyhow!("Batch ended with unfinished steps")),
    }
}
