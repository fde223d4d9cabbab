use anyhow::Result;
use console::style;

use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::settings::Settings;
use crate::core::terminal::print_step;

pub async fn run_list(settings: &Settings) -> Result<()> {
    let registry = IntegrationRegistry::load();
    let config = IntegrationConfig::load(&settings.integrations_path()).await?;

    print_step("Integrations");
    for descriptor in registry.iter() {
        let state = match (descriptor.is_configured(&config), descriptor.hidden) {
            (true, true) => style("configured (hidden)").dim(),
            (true, false) => style("configured").green(),
            (false, _) => style("not set").yellow(),
        };
        println!(
            "  {:<16} {:<18} {:<14} {}",
            style(&descriptor.id).bold(),
            descriptor.name,
            descriptor.category,
            state
        );
    }
    Ok(())
}
