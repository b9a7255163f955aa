//! Configuration for the portal
//!
//! Everything lives under `~/.fabric_portal/` unless `PORTAL_HOME` says
//! otherwise. Settings come from `<home>/config.toml`; every key can be
//! overridden by an environment variable.

use portal_jobs::{
    FabricSettings, OneLakeSettings, DEFAULT_API_BASE, DEFAULT_ARTIFACT_TIMEOUT, DEFAULT_DFS_BASE,
    DEFAULT_POLL_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const HOME_ENV: &str = "PORTAL_HOME";
const HOME_DIR_NAME: &str = ".fabric_portal";
const CONFIG_FILE: &str = "config.toml";

/// Environment variables that override file settings.
pub const ENV_KEYS: &[&str] = &[
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
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Portal home: `$PORTAL_HOME`, else `~/.fabric_portal`.
pub fn portal_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR_NAME)
}

/// Get config file path: <home>/config.toml
pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

/// Get logs directory: <home>/logs
pub fn logs_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

pub fn default_database_url(home: &Path) -> String {
    format!("sqlite:{}?mode=rwc", home.join("portal.sqlite").display())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricSection {
    pub api_base: Option<String>,
    pub workspace_id: String,
    pub pipeline_id: String,
    pub owner_upn: String,
    pub owner_object_id: String,
    pub access_token: Option<String>,
    pub submit_timeout_secs: Option<u64>,
    pub poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OneLakeSection {
    pub dfs_base: Option<String>,
    pub lakehouse_id: String,
    pub storage_token: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

/// Resolved portal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub fabric: FabricSection,
    pub onelake: OneLakeSection,
    pub database: DatabaseSection,
    pub app_version: Option<String>,
    /// Directory the config was resolved against; not part of the file.
    #[serde(skip)]
    pub home: PathBuf,
}

impl PortalConfig {
    /// Load `<home>/config.toml` (if present) and apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let home = portal_home();
        let mut config = Self::from_file(&config_path(&home))?;
        config.home = home;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a config file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay non-empty values from `lookup` (normally the process env).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FABRIC_WORKSPACE_ID") {
            self.fabric.workspace_id = v;
        }
        if let Some(v) = get("FABRIC_PIPELINE_ID") {
            self.fabric.pipeline_id = v;
        }
        if let Some(v) = get("OWNER_UPN") {
            self.fabric.owner_upn = v;
        }
        if let Some(v) = get("OWNER_OBJECT_ID") {
            self.fabric.owner_object_id = v;
        }
        if let Some(v) = get("FABRIC_ACCESS_TOKEN") {
            self.fabric.access_token = Some(v);
        }
        if let Some(v) = get("FABRIC_API_BASE") {
            self.fabric.api_base = Some(v);
        }
        if let Some(v) = get("FABRIC_LAKEHOUSE_ID") {
            self.onelake.lakehouse_id = v;
        }
        if let Some(v) = get("FABRIC_STORAGE_TOKEN") {
            self.onelake.storage_token = Some(v);
        }
        if let Some(v) = get("ONELAKE_DFS_BASE") {
            self.onelake.dfs_base = Some(v);
        }
        if let Some(v) = get("PORTAL_DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Some(v) = get("APP_VERSION") {
            self.app_version = Some(v);
        }
    }

    pub fn database_url(&self) -> String {
        self.database
            .url
            .clone()
            .unwrap_or_else(|| default_database_url(&self.home))
    }

    pub fn app_version(&self) -> String {
        self.app_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }

    /// Settings that must be present before a job can be submitted.
    pub fn missing_for_submit(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let checks = [
            ("FABRIC_WORKSPACE_ID", self.fabric.workspace_id.as_str()),
            ("FABRIC_PIPELINE_ID", self.fabric.pipeline_id.as_str()),
            ("OWNER_UPN", self.fabric.owner_upn.as_str()),
            ("OWNER_OBJECT_ID", self.fabric.owner_object_id.as_str()),
            (
                "FABRIC_ACCESS_TOKEN",
                self.fabric.access_token.as_deref().unwrap_or(""),
            ),
        ];
        for (key, value) in checks {
            if value.trim().is_empty() {
                missing.push(key);
            }
        }
        missing
    }

    /// Settings that must be present before a job can be polled.
    pub fn missing_for_poll(&self) -> Vec<&'static str> {
        match self.fabric.access_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Vec::new(),
            _ => vec!["FABRIC_ACCESS_TOKEN"],
        }
    }

    pub fn fabric_settings(&self) -> FabricSettings {
        FabricSettings {
            api_base: self
                .fabric
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            workspace_id: self.fabric.workspace_id.clone(),
            pipeline_item_id: self.fabric.pipeline_id.clone(),
            owner_upn: self.fabric.owner_upn.clone(),
            owner_object_id: self.fabric.owner_object_id.clone(),
            submit_timeout: self
                .fabric
                .submit_timeout_secs
                .map_or(DEFAULT_SUBMIT_TIMEOUT, Duration::from_secs),
            poll_timeout: self
                .fabric
                .poll_timeout_secs
                .map_or(DEFAULT_POLL_TIMEOUT, Duration::from_secs),
        }
    }

    pub fn onelake_settings(&self) -> OneLakeSettings {
        OneLakeSettings {
            dfs_base: self
                .onelake
                .dfs_base
                .clone()
                .unwrap_or_else(|| DEFAULT_DFS_BASE.to_string()),
            workspace_id: self.fabric.workspace_id.clone(),
            lakehouse_id: self.onelake.lakehouse_id.clone(),
            timeout: self
                .onelake
                .timeout_secs
                .map_or(DEFAULT_ARTIFACT_TIMEOUT, Duration::from_secs),
        }
    }

    /// The resolved configuration with secrets replaced, for display.
    pub fn redacted(&self) -> serde_json::Value {
        let secret = |v: &Option<String>| match v {
            Some(s) if !s.trim().is_empty() => "<redacted>",
            _ => "<unset>",
        };
        let fabric = self.fabric_settings();
        let onelake = self.onelake_settings();

        serde_json::json!({
            "home": self.home.display().to_string(),
            "config_file": config_path(&self.home).display().to_string(),
            "logs_dir": logs_dir(&self.home).display().to_string(),
            "database_url": self.database_url(),
            "app_version": self.app_version(),
            "fabric": {
                "api_base": fabric.api_base,
                "workspace_id": fabric.workspace_id,
                "pipeline_id": fabric.pipeline_item_id,
                "owner_upn": fabric.owner_upn,
                "owner_object_id": fabric.owner_object_id,
                "access_token": secret(&self.fabric.access_token),
                "submit_timeout_secs": fabric.submit_timeout.as_secs(),
                "poll_timeout_secs": fabric.poll_timeout.as_secs(),
            },
            "onelake": {
                "dfs_base": onelake.dfs_base,
                "lakehouse_id": onelake.lakehouse_id,
                "storage_token": secret(&self.onelake.storage_token),
                "timeout_secs": onelake.timeout.as_secs(),
            },
        })
    }
}

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show the resolved configuration
pub fn run(args: ConfigArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let redacted = config.redacted();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&redacted)?);
        return Ok(());
    }

    println!("Portal home:    {}", config.home.display());
    println!("Config file:    {}", config_path(&config.home).display());
    println!("Logs:           {}", logs_dir(&config.home).display());
    println!("Database:       {}", config.database_url());
    println!("App version:    {}", config.app_version());
    println!();

    let rows = flatten(&redacted, "")
        .into_iter()
        .filter(|(key, _)| key.starts_with("fabric.") || key.starts_with("onelake."))
        .map(|(key, value)| vec![key, value])
        .collect();
    crate::cli::output::print_table(&["SETTING", "VALUE"], rows);
    Ok(())
}

fn flatten(value: &serde_json::Value, prefix: &str) -> Vec<(String, String)> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .flat_map(|(k, v)| {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(v, &key)
            })
            .collect(),
        serde_json::Value::String(s) => vec![(prefix.to_string(), s.clone())],
        other => vec![(prefix.to_string(), other.to_string())],
    }
}
