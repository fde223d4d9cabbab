use std::path::Path;
use std::process::{Command, Output};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn pmrelay(args: &[&str]) -> TestResult<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_pmrelay"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()?)
}

/// Writes a settings file pointing at `integrations` and a substrate command
/// that does not exist.
fn write_settings(dir: &Path, integrations: &str) -> TestResult<String> {
    let ints = dir.join("integrations.json");
    std::fs::write(&ints, integrations)?;
    let settings = dir.join("pmrelay.toml");
    std::fs::write(
        &settings,
        format!(
            "[paths]\nintegrations = {:?}\noperations = {:?}\n\n[substrate]\ncommand = \"pmrelay-missing-substrate\"\ninit_timeout_secs = 1\n",
            ints.to_string_lossy(),
            dir.join("ops").to_string_lossy()
        ),
    )?;
    Ok(settings.to_string_lossy().to_string())
}

#[test]
fn help_lists_commands() -> TestResult<()> {
    let out = pmrelay(&["--help"])?;
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for cmd in ["integrations", "health", "deploy", "execute"] {
        assert!(stdout.contains(cmd), "help missing {}: {}", cmd, stdout);
    }
    Ok(())
}

#[test]
fn integrations_reports_configured_state() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let settings = write_settings(
        dir.path(),
        r#"{"jiraServerUrl": "http://jira.local", "firefliesServerUrl": "http://ff.local"}"#,
    )?;

    let out = pmrelay(&["integrations", "--settings", &settings])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = |id: &str| {
        stdout
            .lines()
            .find(|l| l.contains(id))
            .map(str::to_string)
            .unwrap_or_default()
    };
    assert!(line("jira").contains("configured"));
    assert!(line("linear").contains("not set"));
    assert!(line("fireflies").contains("hidden"));
    Ok(())
}

#[test]
fn execute_requires_batch_flag() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let settings = write_settings(dir.path(), "{}")?;
    let out = pmrelay(&["execute", "--settings", &settings])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Missing --batch"));
    Ok(())
}

#[test]
fn deploy_fails_cleanly_without_substrate() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let settings = write_settings(dir.path(), "{}")?;
    let out = pmrelay(&["deploy", "--settings", &settings])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Failed to start substrate peer"), "{}", stderr);
    Ok(())
}

#[test]
fn unknown_command_is_rejected() -> TestResult<()> {
    let out = pmrelay(&["frobnicate"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unknown command"));
    Ok(())
}

#[test]
fn invoke_requires_integration_id() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let settings = write_settings(dir.path(), "{}")?;
    let out = pmrelay(&["invoke", "--settings", &settings])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage: pmrelay invoke"));
    Ok(())
}
