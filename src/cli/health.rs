use anyhow::Result;
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::connect;
use crate::core::health::probe::HttpProber;
use crate::core::health::{HealthMap, HealthMonitor, HealthStatus};
use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::settings::Settings;
use crate::core::terminal::{print_info, print_step};

fn print_health(registry: &IntegrationRegistry, config: &IntegrationConfig, health: &HealthMap) {
    print_step("Integration health");
    for descriptor in registry.iter().filter(|d| !d.hidden) {
        let status = match health.get(&descriptor.id) {
            Some(HealthStatus::Ok) => style("ok").green(),
            Some(HealthStatus::Unreachable) => style("unreachable").red(),
            Some(HealthStatus::Checking) => style("checking").yellow(),
            Some(HealthStatus::Unchecked) => style("unchecked").dim(),
            None if descriptor.is_configured(config) => style("unchecked").dim(),
            None => style("not set").dim(),
        };
        println!(
            "  {:<16} {:<12} {}",
            style(&descriptor.id).bold(),
            status,
            descriptor.endpoint(config)
        );
    }
    let summary = health.summary();
    println!(
        "\n  {} ok, {} unreachable",
        style(summary.ok).green(),
        style(summary.unreachable).red()
    );
}

pub async fn run_health(settings: &Settings, watch: bool) -> Result<()> {
    let registry = Arc::new(IntegrationRegistry::load());
    let config_path = settings.integrations_path();
    let mut config = IntegrationConfig::load(&config_path).await?;

    let _connection = connect(settings).await?;
    let monitor = HealthMonitor::new(
        registry.clone(),
        Arc::new(HttpProber::new()),
        settings.health_settings(),
    );
    monitor.update_config(config.clone());
    monitor.set_connected(true);

    let health = monitor.check_now().await;
    print_health(&registry, &config, &health);
    if !watch {
        monitor.set_connected(false);
        return Ok(());
    }

    print_info("Watching for configuration changes (Enter to recheck, Ctrl+C to stop)");
    let mut rx = monitor.subscribe();
    let mut reload = tokio::time::interval(Duration::from_secs(1));
    let mut keys = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = keys.next_line(), if stdin_open => match line {
                Ok(Some(_)) => monitor.recheck(),
                _ => stdin_open = false,
            },
            _ = reload.tick() => {
                match IntegrationConfig::load(&config_path).await {
                    Ok(latest) if latest != config => {
                        config = latest;
                        monitor.update_config(config.clone());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to reload {}: {}", config_path.display(), e),
                }
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let health = rx.borrow_and_update().clone();
                if health.is_settled() {
                    print_health(&registry, &config, &health);
                }
            }
        }
    }

    monitor.set_connected(false);
    Ok(())
}
