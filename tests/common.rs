use assert_cmd::Command;
use datatracker::ledger::Ledger;
use std::fs;
use tempfile::TempDir;

/// Replays `fixture` through the tracker binary into a fresh data directory
/// and returns the resulting ledger document.
pub fn replay_fixture_and_load(fixture: &str) -> (TempDir, Ledger) {
    let tmp = tempfile::tempdir().expect("create tempdir");
    let data_dir = tmp.path().join("data");
    // Minimal config pointing at the temp data dir
    let cfg_path = tmp.path().join("datatracker.toml");
    let cfg = format!(
        "service_name = \"e2e-test\"\nlog_level = \"info\"\ndata_directory = \"{}\"\n",
        data_dir.display()
    );
    fs::write(&cfg_path, cfg).expect("write config");

    Command::new(assert_cmd::cargo::cargo_bin!("datatracker"))
        .arg(&cfg_path)
        .arg("--replay")
        .arg(fixture)
        .assert()
        .success();

    let raw = fs::read_to_string(data_dir.join("daily.json"))
        .unwrap_or_else(|_| panic!("no ledger written under {}", data_dir.display()));
    let ledger: Ledger = serde_json::from_str(&raw).expect("ledger parses");
    (tmp, ledger)
}
