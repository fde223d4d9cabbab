use anyhow::Result;

use super::{connect, load_definitions};
use crate::core::assets::deploy_and_resolve;
use crate::core::settings::Settings;
use crate::core::terminal::{print_status, print_step, print_success, print_warn};

pub async fn run_deploy(settings: &Settings) -> Result<()> {
    let definitions = load_definitions(settings).await?;
    print_step(&format!("Deploying {} operation(s)", definitions.len()));

    let connection = connect(settings).await?;
    let assets = deploy_and_resolve(&connection, &definitions).await?;

    if assets.is_empty() {
        print_warn("No operations resolved on the substrate.");
        return Ok(());
    }
    for (name, id) in assets.iter() {
        print_status(name, id);
    }
    print_success(&format!("{} operation(s) ready", assets.len()));
    Ok(())
}
