//! Integration tests for the synctrust CLI commands
//!
//! Each test runs the built binary against its own configuration
//! directory and master key.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const MASTER_KEY: &str = "0123456789abcdef0123456789abcdef";

fn synctrust(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_synctrust"))
        .args(args)
        .env("SYNCTRUST_CONFIG_DIR", config_dir)
        .env("AUTH_ENCRYPT_KEY", MASTER_KEY)
        .env("RUST_LOG", "off")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run synctrust")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_cli_init_provisions_default_key() {
    let temp_dir = TempDir::new().unwrap();

    let output = synctrust(temp_dir.path(), &["init"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("synctrust initialized"));
    assert!(temp_dir.path().join("config.toml").exists());
    assert!(temp_dir.path().join("authdata.enc").exists());

    let output = synctrust(temp_dir.path(), &["keys", "list"]);
    assert_eq!(stdout(&output).trim(), "default");
}

#[test]
fn test_cli_rejects_bad_master_key() {
    let temp_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_synctrust"))
        .args(["keys", "list"])
        .env("SYNCTRUST_CONFIG_DIR", temp_dir.path())
        .env("AUTH_ENCRYPT_KEY", "too short")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("AUTH_ENCRYPT_KEY"));
    assert!(!temp_dir.path().join("authdata.enc").exists());
}

#[test]
fn test_cli_encrypt_decrypt_through_connection() {
    let temp_dir = TempDir::new().unwrap();

    let output = synctrust(temp_dir.path(), &["keys", "show", "default"]);
    assert!(output.status.success());
    let pem_path = temp_dir.path().join("self.pem");
    std::fs::write(&pem_path, stdout(&output)).unwrap();

    let output = synctrust(
        temp_dir.path(),
        &["connections", "add", "loopback", pem_path.to_str().unwrap()],
    );
    assert!(output.status.success());

    let output = synctrust(temp_dir.path(), &["encrypt", "loopback", "hello there"]);
    assert!(output.status.success());
    let ciphertext = stdout(&output);

    let output = synctrust(temp_dir.path(), &["decrypt", ciphertext.trim()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "hello there");
}

#[test]
fn test_cli_trigger_reports_jobs() {
    let temp_dir = TempDir::new().unwrap();

    assert!(synctrust(temp_dir.path(), &["events", "add-log", "note", "-m", "changed"]).status.success());
    assert!(synctrust(temp_dir.path(), &["listeners", "add", "watcher", "docs", "note", "ghost"]).status.success());

    let output = synctrust(temp_dir.path(), &["trigger", "docs"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("note"));
    assert!(!out.contains("ghost ("));

    let output = synctrust(temp_dir.path(), &["trigger", "unrelated"]);
    assert!(stdout(&output).contains("No jobs subscribed"));
}

#[test]
fn test_cli_trigger_fails_when_a_job_fails() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("tracked.txt");
    std::fs::write(&file, b"v1").unwrap();

    assert!(synctrust(
        temp_dir.path(),
        &["items", "add", file.to_str().unwrap(), "--name", "tracked"]
    )
    .status
    .success());
    assert!(synctrust(temp_dir.path(), &["events", "add-verify", "check"]).status.success());
    assert!(synctrust(temp_dir.path(), &["listeners", "add", "l", "tracked", "check"]).status.success());

    assert!(synctrust(temp_dir.path(), &["trigger", "tracked"]).status.success());

    std::fs::write(&file, b"v2").unwrap();
    let output = synctrust(temp_dir.path(), &["trigger", "tracked"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_fingerprint_needs_no_master_key() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("data.bin");
    std::fs::write(&file, b"Test data").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_synctrust"))
        .args(["fingerprint", file.to_str().unwrap()])
        .env_remove("AUTH_ENCRYPT_KEY")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim().len(), 64);
}

#[test]
fn test_cli_items_add_without_name_uses_timestamp() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("photos");
    std::fs::create_dir(&dir).unwrap();

    let output = synctrust(temp_dir.path(), &["items", "add", dir.to_str().unwrap()]);
    assert!(output.status.success());

    let output = synctrust(temp_dir.path(), &["items", "list"]);
    let listed = stdout(&output);
    let name = listed.split_whitespace().next().unwrap();
    assert!(name.parse::<i64>().is_ok());
    assert!(listed.contains("(dir, localhost)"));
}
