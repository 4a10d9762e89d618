//! Smoke tests -- verify the binary runs and key subcommands work.

use assert_cmd::Command;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("crisisctrl").unwrap();
    cmd.env_remove("CRISISCTRL_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Real-time emergency incident dispatch"));
}

#[test]
fn test_cli_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("crisisctrl"));
}

#[test]
fn test_serve_subcommand_exists() {
    cli().args(["serve", "--help"]).assert().success();
}

#[test]
fn test_units_lists_registry_in_order() {
    cli()
        .arg("units")
        .assert()
        .success()
        .stdout(predicates::str::contains("Unit_Alpha"))
        .stdout(predicates::str::contains("Fallback unit: Unit_Charlie"));
}

#[test]
fn test_locations_json() {
    cli()
        .args(["locations", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Tirunelveli"))
        .stdout(predicates::str::contains("riskZones"));
}

#[test]
fn test_assign_cyclone() {
    cli()
        .args(["assign", "Cyclone Warning"])
        .assert()
        .success()
        .stdout(predicates::str::diff("Unit_Bravo\n"));
}

#[test]
fn test_assign_with_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("crisisctrl.toml");
    std::fs::write(
        &path,
        r#"
[assignment]
default_unit = "Unit_Zeta"

[[units]]
id = "Unit_Zeta"
type = "General"
base = { lat = 0.0, lng = 0.0 }
specialty = []
"#,
    )
    .unwrap();

    cli()
        .args(["assign", "Cyclone Warning", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicates::str::diff("Unit_Zeta\n"));
}

#[test]
fn test_broken_named_config_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[broadcast]\nsubscriber_buffer = 0\n").unwrap();

    cli()
        .env("CRISISCTRL_CONFIG", &path)
        .arg("units")
        .assert()
        .failure()
        .stderr(predicates::str::contains("CRISISCTRL_CONFIG"));
}
