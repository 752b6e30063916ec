use assert_cmd::prelude::*;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::process::Command;

fn promptrelay() -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("promptrelay");
    let mut cmd = Command::new(bin);
    cmd.env_remove("PROMPTRELAY_TIMEOUT_MODIFIER")
        .env_remove("PROMPTRELAY_POLL_INTERVAL_MS")
        .env("RUST_LOG", "warn");
    cmd
}

fn fixture(name: &str) -> String {
    let path = Path::new("tests/fixtures").join(name);
    assert!(path.exists(), "fixture missing: {}", path.display());
    path.to_str().unwrap().to_string()
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(&stdout).expect("valid json")
}

#[test]
fn run_submits_prompt_and_extracts_from_clipboard() {
    let page = fixture("chat_page.yaml");
    let assert = promptrelay()
        .args(["--output", "json", "run", "generic", "-p", "Summarise", "-f", &page])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["response"], "## Result\n\nAll done.");
    assert_eq!(value["signals"][0]["type"], "ready-for-extraction");
    assert_eq!(value["signals"].as_array().unwrap().len(), 1);

    let report = &value["report"];
    assert_eq!(report["provider"], "generic");
    let phases: Vec<&str> = report["phases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["phase"].as_str().unwrap())
        .collect();
    assert_eq!(phases, vec!["init", "wait_ready", "send_prompt", "notify_ready"]);
    assert!(value.get("error").is_none());
}

#[test]
fn login_page_stops_with_single_login_signal() {
    let page = fixture("login_page.yaml");
    let assert = promptrelay()
        .args(["--output", "json", "run", "claude", "-p", "Hello", "-f", &page])
        .assert()
        .failure();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["error"]["code"], "WAIT_READY_FAILED");
    assert_eq!(value["error"]["diagnostics"]["cause_code"], "LOGIN_REQUIRED");
    let signals = value["signals"].as_array().unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["type"], "login-required");
    assert!(value.get("response").is_none());
}

#[test]
fn unknown_provider_fails_during_init() {
    let page = fixture("chat_page.yaml");
    let assert = promptrelay()
        .args(["--output", "json", "run", "bard", "-p", "Hello", "-f", &page])
        .assert()
        .failure();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["error"]["code"], "INIT_FAILED");
    assert_eq!(value["error"]["diagnostics"]["cause_code"], "UNKNOWN_PROVIDER");
    assert_eq!(value["signals"][0]["type"], "automation-failed");
    assert_eq!(value["signals"][0]["code"], "INIT_FAILED");
}

#[test]
fn config_file_sets_default_timeout_modifier() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "default_timeout_modifier: 2.0").unwrap();
    let page = fixture("chat_page.yaml");

    let assert = promptrelay()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "--output",
            "json",
            "run",
            "gemini",
            "-p",
            "Hi",
            "-f",
            &page,
            "--no-extract",
        ])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["report"]["timeout_modifier"], 2.0);
    assert!(value.get("response").is_none());
}

#[test]
fn providers_lists_every_builtin() {
    let assert = promptrelay()
        .args(["--output", "json", "providers"])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    let ids: Vec<&str> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|summary| summary["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["aistudio", "chatgpt", "claude", "gemini", "generic"]);
}

#[test]
fn check_reports_locator_presence_for_fixture() {
    let page = fixture("login_page.yaml");
    let assert = promptrelay()
        .args(["--output", "json", "check", "--fixture", &page])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["page"]["liveness"]["url"], "https://chat.example/auth");
    let generic = value["page"]["providers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|presence| presence["provider"] == "generic")
        .unwrap();
    let login_hits: u64 = generic["login_markers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|count| count["count"].as_u64().unwrap())
        .sum();
    assert_eq!(login_hits, 2);
}
