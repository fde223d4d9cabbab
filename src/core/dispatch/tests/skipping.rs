use super::{connected, run, small_registry};
use crate::core::assets::AssetMap;
use crate::core::dispatch::{Dispatcher, StepTransition};
use crate::core::integrations::IntegrationConfig;
use crate::core::testing::item;

#[tokio::test]
async fn unconfigured_target_is_skipped_even_with_items() {
    let registry = small_registry();
    let (substrate, conn, assets) = connected(&registry).await;
    let dispatcher = Dispatcher::new(registry);
    let config = IntegrationConfig::new().with("alphaUrl", "http://alpha.local");

    let batch = vec![item("alpha", "x"), item("beta", "y")];
    let updates = run(&dispatcher, &conn, &assets, &batch, &config).await;

    let beta: Vec<_> = updates.iter().filter(|u| u.id == "beta").collect();
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].transition, StepTransition::Skipped);
    assert_eq!(substrate.invocations().len(), 1);
}

#[tokio::test]
async fn configured_target_without_items_is_skipped() {
    let registry = small_registry();
    let (substrate, conn, assets) = connected(&registry).await;
    let dispatcher = Dispatcher::new(registry);
    let config = IntegrationConfig::new()
        .with("alphaUrl", "http://alpha.local")
        .with("betaUrl", "http://beta.local");

    let updates = run(&dispatcher, &conn, &assets, &[item("alpha", "x")], &config).await;

    let beta: Vec<_> = updates.iter().filter(|u| u.id == "beta").collect();
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].transition, StepTransition::Skipped);
    assert_eq!(substrate.invocations().len(), 1);
}

#[tokio::test]
async fn unresolved_operation_is_skipped_not_an_error() {
    let registry = small_registry();
    let (substrate, conn, assets) = connected(&registry).await;
    let dispatcher = Dispatcher::new(registry);
    let config = IntegrationConfig::new()
        .with("alphaUrl", "http://alpha.local")
        .with("betaUrl", "http://beta.local");

    let partial: AssetMap = assets
        .iter()
        .filter(|(name, _)| *name != "pm:executeAlphaActions")
        .map(|(n, id)| (n.to_string(), id.to_string()))
        .collect();

    let batch = vec![item("alpha", "x"), item("beta", "y")];
    let updates = run(&dispatcher, &conn, &partial, &batch, &config).await;

    assert_eq!(updates[0].id, "alpha");
    assert_eq!(updates[0].transition, StepTransition::Skipped);
    let invoked: Vec<_> = substrate.invocations().into_iter().map(|(n, _)| n).collect();
    assert_eq!(invoked, vec!["pm:executeBetaActions"]);
}

#[tokio::test]
async fn items_for_unknown_targets_are_ignored() {
    let registry = small_registry();
    let (substrate, conn, assets) = connected(&registry).await;
    let dispatcher = Dispatcher::new(registry);
    let config = IntegrationConfig::new().with("alphaUrl", "http://alpha.local");

    // alpha configured with an item, beta unconfigured, gamma has no descriptor.
    let batch = vec![item("alpha", "x"), item("gamma", "lost")];
    let updates = run(&dispatcher, &conn, &assets, &batch, &config).await;

    let terminal: Vec<_> = updates
        .iter()
        .filter(|u| u.transition.status().is_terminal())
        .map(|u| (u.id.as_str(), u.transition.status().as_str()))
        .collect();
    assert_eq!(terminal, vec![("alpha", "success"), ("beta", "skipped")]);
    assert_eq!(substrate.invocations().len(), 1);
}
