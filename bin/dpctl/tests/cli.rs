//! ---
//! dp_section: "05-external-interfaces"
//! dp_subsection: "integration-tests"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Command-line behaviour of the provenance control CLI."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::tempdir;

fn dpctl(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dpctl").unwrap();
    cmd.env_remove("DP_CONFIG").arg("--config").arg(config);
    cmd
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = dir.join("dp.toml");
    let ledger = dir.join("ledger.ndjson");
    let key = dir.join("signing.key");
    fs::write(
        &config,
        format!(
            "[provenance]\nledger_path = {:?}\nsigning_key_path = {:?}\ngenerate_key_if_missing = true\nrequire_signatures = true\n",
            ledger.display().to_string(),
            key.display().to_string()
        ),
    )
    .unwrap();
    config
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn record_verify_and_export_flow() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let raw = dir.path().join("raw.txt");
    let summary = dir.path().join("summary.txt");
    fs::write(&raw, "measurements").unwrap();
    fs::write(&summary, "mean=4").unwrap();

    dpctl(&config)
        .args(["record", "--asset", "raw", "--actor", "sensor", "--path"])
        .arg(&raw)
        .assert()
        .success();
    dpctl(&config)
        .args([
            "record", "--asset", "summary", "--actor", "analyst", "--action", "derived",
            "--parent", "raw", "--meta", "tool=stats", "--path",
        ])
        .arg(&summary)
        .assert()
        .success();

    let verify = dpctl(&config).arg("verify").output().unwrap();
    assert!(verify.status.success());
    assert!(stdout(&verify).contains("ledger intact"));

    let lineage = dpctl(&config).args(["lineage", "summary"]).output().unwrap();
    assert!(stdout(&lineage).contains("ancestors: raw"));

    let bundle = dir.path().join("summary.bundle.json");
    dpctl(&config)
        .args(["export", "summary", "--out"])
        .arg(&bundle)
        .assert()
        .success();
    let check = dpctl(&config)
        .arg("check-bundle")
        .arg(&bundle)
        .arg("--path")
        .arg(&summary)
        .output()
        .unwrap();
    assert!(check.status.success());
    assert!(stdout(&check).contains("bundle intact"));

    fs::write(&summary, "mean=5").unwrap();
    dpctl(&config)
        .arg("check-bundle")
        .arg(&bundle)
        .arg("--path")
        .arg(&summary)
        .assert()
        .failure();

    let run = dpctl(&config).arg("run").output().unwrap();
    assert!(run.status.success());
    assert_eq!(stdout(&run).trim(), "ok");
}

#[test]
fn verify_fails_on_tampered_ledger() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let doc = dir.path().join("doc.txt");
    fs::write(&doc, "v1").unwrap();
    dpctl(&config)
        .args(["record", "--asset", "doc", "--actor", "alice", "--path"])
        .arg(&doc)
        .assert()
        .success();

    let ledger = dir.path().join("ledger.ndjson");
    let tampered = fs::read_to_string(&ledger).unwrap().replace("alice", "mallory");
    fs::write(&ledger, tampered).unwrap();

    let verify = dpctl(&config).arg("verify").output().unwrap();
    assert!(!verify.status.success());
    assert!(stdout(&verify).contains("hash mismatch"));
    dpctl(&config).arg("run").assert().failure();
}

#[test]
fn digest_and_key_commands() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("empty.bin");
    fs::write(&file, b"").unwrap();
    let digest = Command::cargo_bin("dpctl")
        .unwrap()
        .arg("digest")
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(
        stdout(&digest).trim(),
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );

    let key = dir.path().join("keys/ops.key");
    let generated = Command::cargo_bin("dpctl")
        .unwrap()
        .args(["keys", "generate", "--out"])
        .arg(&key)
        .output()
        .unwrap();
    assert!(generated.status.success());
    let shown = Command::cargo_bin("dpctl")
        .unwrap()
        .args(["keys", "show"])
        .arg(&key)
        .output()
        .unwrap();
    assert_eq!(stdout(&generated), stdout(&shown));

    Command::cargo_bin("dpctl")
        .unwrap()
        .args(["keys", "generate", "--out"])
        .arg(&key)
        .assert()
        .failure();
}

#[test]
fn logging_section_writes_log_file_and_keeps_stdout_clean() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let logs = dir.path().join("logs");
    let mut doc = fs::read_to_string(&config).unwrap();
    doc.push_str(&format!(
        "\n[logging]\ndirectory = {:?}\nformat = \"pretty\"\n",
        logs.display().to_string()
    ));
    fs::write(&config, doc).unwrap();

    let run = dpctl(&config).arg("run").output().unwrap();
    assert!(run.status.success());
    assert_eq!(stdout(&run).trim(), "ok");

    let files: Vec<String> = fs::read_dir(&logs)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(files.iter().any(|name| name.starts_with("dpctl")), "{files:?}");
}

#[test]
fn dp_config_env_is_used_without_flag() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let doc = dir.path().join("doc.txt");
    fs::write(&doc, "v1").unwrap();

    Command::cargo_bin("dpctl")
        .unwrap()
        .current_dir(dir.path())
        .env("DP_CONFIG", &config)
        .args(["record", "--asset", "doc", "--actor", "alice", "--path"])
        .arg(&doc)
        .assert()
        .success();
    assert!(dir.path().join("ledger.ndjson").is_file());
    assert!(dir.path().join("signing.key").is_file());
}
