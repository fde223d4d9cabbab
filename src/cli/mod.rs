mod deploy;
mod execute;
mod health;
mod integrations;
mod invoke;

use anyhow::{Result, anyhow};
use console::style;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::core::settings::Settings;
use crate::core::substrate::rpc::RpcSubstrate;
use crate::core::substrate::{Connection, OperationDefinition};
use crate::core::terminal::GuideSection;

fn print_help() {
    GuideSection::new("Integrations")
        .command("integrations", "List known integrations and their configuration state")
        .command("health", "Check every configured endpoint (--watch to keep polling)")
        .print();

    GuideSection::new("Dispatch")
        .command("deploy", "Deploy operations to the substrate and show resolved ids")
        .command("execute", "Run an action batch (--batch <file.json>)")
        .command("invoke", "Run one integration's operation (<id> [--params <file.json>])")
        .print();

    GuideSection::new("Options")
        .command("--settings", "Path to pmrelay.toml")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("pmrelay").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommandFlags {
    pub settings: Option<PathBuf>,
    pub batch: Option<PathBuf>,
    pub params: Option<PathBuf>,
    pub watch: bool,
}

pub(crate) fn parse_command_flags(args: &[String], start: usize) -> CommandFlags {
    let mut flags = CommandFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" | "-s" => {
                if i + 1 < args.len() {
                    flags.settings = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--batch" | "-b" => {
                if i + 1 < args.len() {
                    flags.batch = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--params" | "-p" => {
                if i + 1 < args.len() {
                    flags.params = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--watch" | "-w" => {
                flags.watch = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    flags
}

/// Spawns the substrate peer and wraps it in a fresh connection.
pub(crate) async fn connect(settings: &Settings) -> Result<Connection> {
    let substrate = RpcSubstrate::spawn(&settings.peer_command()).await?;
    Ok(Connection::new(substrate))
}

pub(crate) async fn load_definitions(settings: &Settings) -> Result<Vec<OperationDefinition>> {
    let dir = settings.operations_dir();
    if !dir.exists() {
        warn!(
            "Operations directory {} not found, deploying nothing",
            dir.display()
        );
        return Ok(Vec::new());
    }
    OperationDefinition::load_dir(&dir).await
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };
    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let flags = parse_command_flags(&args, 2);
    let settings = Settings::load(flags.settings.as_deref()).await?;
    crate::logging::init(settings.log_level());
    match &settings.source {
        Some(path) => info!(
            "Loaded settings from {}: substrate={}, debounce={}ms, probe_timeout={}ms",
            path.display(),
            settings.substrate.command,
            settings.health.debounce_ms,
            settings.health.probe_timeout_ms
        ),
        None => info!("No settings file found, using defaults"),
    }

    match command {
        "integrations" => integrations::run_list(&settings).await,
        "deploy" => deploy::run_deploy(&settings).await,
        "execute" => {
            let batch = flags
                .batch
                .ok_or_else(|| anyhow!("Missing --batch <file.json>"))?;
            execute::run_execute(&settings, &batch).await
        }
        "invoke" => {
            let integration = args
                .get(2)
                .filter(|a| !a.starts_with('-'))
                .ok_or_else(|| anyhow!("Usage: pmrelay invoke <integration> [--params <file.json>]"))?;
            invoke::run_invoke(&settings, integration, flags.params.as_deref()).await
        }
        "health" => health::run_health(&settings, flags.watch).await,
        other => {
            print_help();
            Err(anyhow!("Unknown command '{}'", other))
        }
    }
}
