//! End-to-end tests for the config subcommands.

use std::process::Command;
use tempfile::TempDir;

fn kiosk() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stopmo-kiosk"))
}

#[test]
fn test_config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kiosk").join("config.toml");

    let init = kiosk()
        .args(["--config"])
        .arg(&path)
        .args(["config", "init"])
        .output()
        .unwrap();
    assert!(init.status.success(), "init failed: {:?}", init);
    assert!(path.exists());

    let show = kiosk().arg("-c").arg(&path).args(["config", "show"]).output().unwrap();
    assert!(show.status.success());
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("(exists)"));
    assert!(stdout.contains("max_saved = 25"));
    assert!(stdout.contains("libcamera-vid"));
}

#[test]
fn test_config_init_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "# mine\n").unwrap();

    let init = kiosk().arg("-c").arg(&path).args(["config", "init"]).output().unwrap();
    assert!(!init.status.success());
    assert!(String::from_utf8_lossy(&init.stderr).contains("already exists"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");
}

#[test]
fn test_malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[session]\nmax_saved = \"lots\"\n").unwrap();

    let show = kiosk().arg("-c").arg(&path).args(["config", "show"]).output().unwrap();
    assert!(!show.status.success());
    assert!(String::from_utf8_lossy(&show.stderr).contains("Failed to parse config file"));
}
