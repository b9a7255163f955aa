mod cli_support;

use cli_support::TestHome;
use serde_json::Value;

#[test]
fn test_config_json_redacts_secrets() {
    let home = TestHome::configured("http://127.0.0.1:9");
    let config: Value = home.run_json(&["config", "--json"]);

    assert_eq!(config["fabric"]["workspace_id"], "ws-1");
    assert_eq!(config["fabric"]["access_token"], "<redacted>");
    assert_eq!(config["onelake"]["storage_token"], "<redacted>");
    let text = config.to_string();
    assert!(!text.contains("api-token"));
    assert!(!text.contains("storage-token"));
}

#[test]
fn test_config_reads_home_file() {
    let home = TestHome::new();
    std::fs::write(
        home.dir.path().join("config.toml"),
        "[fabric]\nworkspace_id = \"from-file\"\n",
    )
    .unwrap();

    let config: Value = home.run_json(&["config", "--json"]);
    assert_eq!(config["fabric"]["workspace_id"], "from-file");
    assert_eq!(config["fabric"]["access_token"], "<unset>");
}

#[test]
fn test_status_on_fresh_home() {
    let home = TestHome::new();
    let status: Value = home.run_json(&["status", "--json"]);

    assert_eq!(status["lock"]["held"], false);
    assert!(status["lock"]["holder"].is_null());
    assert!(status["active_run"].is_null());
    assert!(status["latest_successful_run"].is_null());
    assert_eq!(status["stats"]["total"], 0);
    assert!(home.dir.path().join("portal.sqlite").exists());
}

#[test]
fn test_submit_without_config_fails_before_submitting() {
    let home = TestHome::new();
    let err = home.run_json_error(&["submit", "sales.xlsx", "--by", "alice", "--json"]);

    assert!(err["error"].as_str().unwrap().contains("FABRIC_PIPELINE_ID"));
    let status: Value = home.run_json(&["status", "--json"]);
    assert_eq!(status["stats"]["total"], 0);
    assert_eq!(status["lock"]["held"], false);
}

#[test]
fn test_show_rejects_bad_run_id() {
    let home = TestHome::new();
    let err = home.run_json_error(&["show", "nope", "--json"]);
    assert!(err["error"].as_str().unwrap().contains("Invalid run id"));
}

#[test]
fn test_refresh_without_active_run() {
    let home = TestHome::new();
    let refresh: Value = home.run_json(&["refresh", "--json"]);
    assert!(refresh["outcome"].is_null());
}

#[test]
fn test_unlock_when_free() {
    let home = TestHome::new();
    let unlock: Value = home.run_json(&["unlock", "--by", "ops", "--json"]);
    assert!(unlock["evicted"].is_null());
    assert_eq!(unlock["warnings"].as_array().unwrap().len(), 0);
}

#[test]
fn test_human_error_output() {
    let home = TestHome::new();
    let output = home.run(&["submit", "sales.xlsx", "--by", "alice"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: Missing configuration"), "stderr: {stderr}");
    assert!(stderr.contains("TRY:"));
}
