use assert_cmd::Command;
use predicates::str::contains;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "").unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn db_path(&self) -> PathBuf {
        self.path().join("data").join("dealmind.db")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dealmind"));
        cmd.arg("--db-path")
            .arg(self.db_path())
            .arg("--config")
            .arg(self.path().join("config.toml"))
            .env_remove("OPENAI_API_KEY")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dealmind"));
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("Dealmind"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dealmind"));
    cmd.arg("--version").assert().success();
}

#[test]
fn test_ingest_then_search() {
    let ws = Workspace::new();
    ws.cmd()
        .args([
            "ingest",
            "--domain",
            "lbo",
            "--text",
            "Senior debt typically 4–6x EBITDA",
            "--meta",
            "source=handbook",
        ])
        .assert()
        .success()
        .stdout(contains("Stored"));
    ws.cmd()
        .args([
            "ingest",
            "--domain",
            "lbo",
            "--text",
            "Management rollover of 10% of equity",
        ])
        .assert()
        .success();

    let output = ws
        .cmd()
        .args(["--format", "json", "search", "debt structure for LBO", "--domain", "lbo", "-k", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["text"], "Senior debt typically 4–6x EBITDA");
    assert_eq!(hits[0]["metadata"]["source"], "handbook");
    assert_eq!(hits[0]["metadata"]["domain"], "lbo");
}

#[test]
fn test_search_other_domain_is_empty() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["ingest", "--domain", "debt", "--text", "Revolver undrawn at close"])
        .assert()
        .success();
    ws.cmd()
        .args(["search", "revolver", "--domain", "lending"])
        .assert()
        .success()
        .stdout(contains("No matches in lending"));
}

#[test]
fn test_ingest_rejects_unknown_domain() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["ingest", "--domain", "crypto", "--text", "anything"])
        .assert()
        .failure()
        .stderr(contains("unknown domain"));
}

#[test]
fn test_prefs_round_trip() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["prefs", "set", "--user", "ana", "aggressiveness=aggressive", "default_domain=ma"])
        .assert()
        .success();
    ws.cmd()
        .args(["prefs", "get", "--user", "ana"])
        .assert()
        .success()
        .stdout(contains("aggressiveness = aggressive"))
        .stdout(contains("default_domain = ma"));
    ws.cmd()
        .args(["prefs", "unset", "--user", "ana", "default_domain"])
        .assert()
        .success()
        .stdout(contains("Removed default_domain"));
}

#[test]
fn test_prefs_rejects_invalid_value() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["prefs", "set", "--user", "ana", "condenser=magic"])
        .assert()
        .failure()
        .stderr(contains("condenser"));
}

#[test]
fn test_replay_condenses_transcript() {
    let ws = Workspace::new();
    let transcript = ws.path().join("transcript.json");
    std::fs::write(
        &transcript,
        r#"[
  {"role": "user", "content": "Model the Acme buyout"},
  {"role": "user", "content": "Debt package agreed", "fields": {"debt_terms": "5x EBITDA senior"}},
  {"role": "assistant", "content": "Noted the senior debt"},
  {"role": "user", "content": "Exit in year five"},
  {"role": "assistant", "content": "Set exit year"},
  {"role": "user", "content": "Sponsor equity at 40%"},
  {"role": "assistant", "content": "Updated sources and uses"},
  {"role": "user", "content": "What was the leverage?", "references": [1]}
]"#,
    )
    .unwrap();

    let output = ws
        .cmd()
        .args(["--format", "json", "replay"])
        .arg(&transcript)
        .args(["--domain", "lbo", "--max-events", "4", "--session", "deal-7"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["appended"], 8);
    assert_eq!(report["session"]["session_id"], "deal-7");
    assert_eq!(report["session"]["strategy"], "domain");
    assert!(!report["condensations"].as_array().unwrap().is_empty());

    let history = report["history"].as_array().unwrap();
    assert!(history.len() <= 4);
    let rendered = serde_json::to_string(history).unwrap();
    assert!(rendered.contains("5x EBITDA senior"));
}

#[test]
fn test_replay_rejects_bad_transcript() {
    let ws = Workspace::new();
    let transcript = ws.path().join("bad.json");
    std::fs::write(
        &transcript,
        r#"[{"role": "user", "content": "hi", "fields": {"ltv": 0.6}}]"#,
    )
    .unwrap();

    ws.cmd()
        .arg("replay")
        .arg(&transcript)
        .args(["--domain", "lbo"])
        .assert()
        .failure()
        .stderr(contains("Transcript turn 0 is invalid"));
}

#[test]
fn test_ask_requires_llm() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["ask", "How much leverage?", "--domain", "lbo"])
        .assert()
        .failure()
        .stderr(contains("No LLM configured"));
}
