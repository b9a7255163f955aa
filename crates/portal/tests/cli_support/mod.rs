#![allow(dead_code)]

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Read;
use std::process::{Command, Output};
use std::thread;
use tempfile::TempDir;
use tiny_http::{Header, Response, Server};

/// Settings the binary would otherwise pick up from the developer's shell.
const INHERITED_ENV: &[&str] = &[
    "FABRIC_WORKSPACE_ID",
    "FABRIC_PIPELINE_ID",
    "FABRIC_LAKEHOUSE_ID",
    "OWNER_UPN",
    "OWNER_OBJECT_ID",
    "FABRIC_ACCESS_TOKEN",
    "FABRIC_STORAGE_TOKEN",
    "FABRIC_API_BASE",
    "ONELAKE_DFS_BASE",
    "PORTAL_DATABASE_URL",
    "APP_VERSION",
    "PORTAL_USER",
];

pub fn portal_bin() -> &'static str {
    env!("CARGO_BIN_EXE_portal")
}

/// A throwaway portal home plus the env every invocation gets.
pub struct TestHome {
    pub dir: TempDir,
    pub envs: Vec<(String, String)>,
}

impl TestHome {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let home = dir.path().to_string_lossy().to_string();
        Self {
            dir,
            envs: vec![
                ("PORTAL_HOME".to_string(), home),
                ("RUST_LOG".to_string(), "error".to_string()),
            ],
        }
    }

    /// Fully configured against a fake Fabric service at `base`.
    pub fn configured(base: &str) -> Self {
        let mut home = Self::new();
        for (key, value) in [
            ("FABRIC_API_BASE", base),
            ("ONELAKE_DFS_BASE", base),
            ("FABRIC_WORKSPACE_ID", "ws-1"),
            ("FABRIC_PIPELINE_ID", "pipe-1"),
            ("FABRIC_LAKEHOUSE_ID", "lake-1"),
            ("OWNER_UPN", "etl@example.com"),
            ("OWNER_OBJECT_ID", "oid-1"),
            ("FABRIC_ACCESS_TOKEN", "api-token"),
            ("FABRIC_STORAGE_TOKEN", "storage-token"),
        ] {
            home.envs.push((key.to_string(), value.to_string()));
        }
        home
    }

    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(portal_bin());
        cmd.args(args);
        for key in INHERITED_ENV {
            cmd.env_remove(key);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd.output().expect("failed to execute portal CLI")
    }

    pub fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> T {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "command failed: {}\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let value = parse_json_output(&output);
        serde_json::from_value(value).unwrap_or_else(|err| {
            panic!(
                "failed to deserialize JSON output: {}\nstdout:\n{}",
                err,
                String::from_utf8_lossy(&output.stdout)
            )
        })
    }

    pub fn run_json_error(&self, args: &[&str]) -> serde_json::Value {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "command unexpectedly succeeded: {}\nstdout:\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stdout)
        );
        assert_eq!(output.status.code(), Some(1));
        parse_json_output(&output)
    }
}

pub fn parse_json_output(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_start = stdout.find(|c| c == '{' || c == '[').unwrap_or_else(|| {
        panic!(
            "no JSON payload found in output\nstdout:\n{}\nstderr:\n{}",
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    });
    let mut deserializer = serde_json::Deserializer::from_str(&stdout[json_start..]);
    serde_json::Value::deserialize(&mut deserializer).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}",
            err, stdout
        )
    })
}

/// Fake Fabric + OneLake endpoint.
///
/// Accepts every job submission, reports every job as `Completed`, and
/// serves a KPI file for any per-run path. Runs until the test process
/// exits.
pub fn spawn_fabric() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base = format!("http://{addr}");
    let location = format!("{base}/jobs/job-1");

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let method = request.method().to_string();
            let url = request.url().to_string();

            let response = if method == "POST" && url.contains("/jobs/instances") {
                Response::from_string("")
                    .with_status_code(202)
                    .with_header(Header::from_bytes("Location", location.as_str()).unwrap())
            } else if method == "GET" && url == "/jobs/job-1" {
                Response::from_string(r#"{"id":"job-1","status":"Completed"}"#)
                    .with_status_code(200)
            } else if method == "GET" && url.contains("/results/runs/") && url.ends_with("/kpis.json")
            {
                Response::from_string(r#"{"rows_loaded":42}"#).with_status_code(200)
            } else {
                Response::from_string("not found").with_status_code(404)
            };
            let _ = request.respond(response);
        }
    });

    base
}
