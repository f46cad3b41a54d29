use assert_cmd::Command;
use chipctl::AttestationTrustStore;
use predicates::prelude::*;
use tempfile::TempDir;

/// The binary with storage in `dir` and a config home nobody else writes to.
fn chipctl(dir: &TempDir) -> Command {
    let home = dir.path().join("home");
    let mut cmd = Command::cargo_bin("chipctl").unwrap();
    cmd.env_remove("CHIPCTL_PAA_TRUST_STORE_PATH")
        .env_remove("CHIPCTL_CD_TRUST_STORE_PATH")
        .env_remove("RUST_LOG")
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .arg("--storage-directory")
        .arg(dir.path());
    cmd
}

/// Directory holding one usable PAA certificate
fn paa_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let store = AttestationTrustStore::builtin_test().unwrap();
    std::fs::write(dir.path().join("paa.der"), &store.anchors()[0].der).unwrap();
    dir
}

#[test]
fn test_identity_show_json() {
    let dir = TempDir::new().unwrap();
    chipctl(&dir)
        .args(["--identity", "beta", "--output", "json", "identity", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fabric_id\": 2"))
        .stdout(predicate::str::contains("\"node_id\": 112233"));

    assert!(dir.path().join("chipctl_config.beta.toml").exists());
}

#[test]
fn test_reserved_numeric_identity_exits_2() {
    let dir = TempDir::new().unwrap();
    chipctl(&dir)
        .args(["--identity", "01", "identity", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("numeric identities must be >= 4"));
}

#[test]
fn test_unknown_identity_exits_2() {
    let dir = TempDir::new().unwrap();
    chipctl(&dir)
        .args(["--identity", "delta", "identity", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown commissioner name: delta"));
}

#[test]
fn test_sleep_timeout_exits_124() {
    let dir = TempDir::new().unwrap();
    chipctl(&dir)
        .args(["--timeout", "1", "delay", "sleep", "3000"])
        .assert()
        .code(124);
}

#[test]
fn test_empty_paa_store_exits_2() {
    let dir = TempDir::new().unwrap();
    let paa = TempDir::new().unwrap();
    chipctl(&dir)
        .arg("--paa-trust-store-path")
        .arg(paa.path())
        .args(["identity", "show"])
        .assert()
        .code(2);
}

#[test]
fn test_paa_store_from_environment() {
    let dir = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    chipctl(&dir)
        .env("CHIPCTL_PAA_TRUST_STORE_PATH", empty.path())
        .args(["identity", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no PAA certificates found"));

    let paa = paa_dir();
    chipctl(&dir)
        .env("CHIPCTL_PAA_TRUST_STORE_PATH", paa.path())
        .args(["identity", "show"])
        .assert()
        .success();
}

#[test]
fn test_paa_flag_overrides_environment() {
    let dir = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    let paa = paa_dir();

    chipctl(&dir)
        .env("CHIPCTL_PAA_TRUST_STORE_PATH", empty.path())
        .arg("--paa-trust-store-path")
        .arg(paa.path())
        .args(["identity", "show"])
        .assert()
        .success();

    chipctl(&dir)
        .env("CHIPCTL_PAA_TRUST_STORE_PATH", paa.path())
        .arg("--paa-trust-store-path")
        .arg(empty.path())
        .args(["identity", "show"])
        .assert()
        .code(2);
}

#[test]
fn test_commissioner_vendor_id() {
    let dir = TempDir::new().unwrap();
    chipctl(&dir)
        .args([
            "--commissioner-vendor-id",
            "0x1234",
            "--output",
            "json",
            "identity",
            "show",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"vendor_id\": \"0x1234\""));
}

#[test]
fn test_storage_clear_all() {
    let dir = TempDir::new().unwrap();
    chipctl(&dir).args(["identity", "show"]).assert().success();
    assert!(dir.path().join("chipctl_config.alpha.toml").exists());

    chipctl(&dir)
        .args(["storage", "clear-all", "--yes"])
        .assert()
        .success();
    assert!(!dir.path().join("chipctl_config.alpha.toml").exists());
}
