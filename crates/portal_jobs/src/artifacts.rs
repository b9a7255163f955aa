//! Small result files the pipeline writes to the lakehouse.

use async_trait::async_trait;
use portal_ids::RunId;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{truncate_body, ArtifactError};
use crate::token::TokenSource;

pub const DEFAULT_DFS_BASE: &str = "https://onelake.dfs.fabric.microsoft.com";
pub const DEFAULT_ARTIFACT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lakehouse-relative locations of well-known artifacts.
pub mod paths {
    use portal_ids::RunId;

    pub const CURRENT_KPIS: &str = "Files/results/current/kpis.json";
    pub const CURRENT_IMPORT_PROFILE: &str = "Files/results/current/import_profile.json";

    pub fn run_dir(run_id: &RunId) -> String {
        format!("Files/results/runs/{}", run_id)
    }

    pub fn run_kpis(run_id: &RunId) -> String {
        format!("{}/kpis.json", run_dir(run_id))
    }

    pub fn run_metadata(run_id: &RunId) -> String {
        format!("{}/run_metadata.json", run_dir(run_id))
    }

    pub fn run_import_profile(run_id: &RunId) -> String {
        format!("{}/import_profile.json", run_dir(run_id))
    }
}

/// Reads artifacts by lakehouse-relative path.
#[async_trait]
pub trait ArtifactReader: Send + Sync {
    /// Raw bytes, or `None` when the file does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArtifactError>;

    /// Read and parse a JSON artifact.
    async fn read_json(&self, path: &str) -> Result<Option<serde_json::Value>, ArtifactError> {
        let Some(bytes) = self.read(path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ArtifactError::Malformed {
                path: path.to_string(),
                message: e.to_string(),
            })
    }
}

/// A JSON artifact that was found, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedArtifact {
    pub path: String,
    pub size: usize,
    pub value: serde_json::Value,
}

/// KPI snapshot for a run: the per-run file, else the "current" one.
pub async fn fetch_run_kpis(
    reader: &dyn ArtifactReader,
    run_id: &RunId,
) -> Result<Option<FetchedArtifact>, ArtifactError> {
    for path in [paths::run_kpis(run_id), paths::CURRENT_KPIS.to_string()] {
        if let Some(bytes) = reader.read(&path).await? {
            let value = serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Malformed {
                path: path.clone(),
                message: e.to_string(),
            })?;
            return Ok(Some(FetchedArtifact {
                size: bytes.len(),
                path,
                value,
            }));
        }
    }
    Ok(None)
}

/// Coordinates of the lakehouse artifacts are read from.
#[derive(Debug, Clone)]
pub struct OneLakeSettings {
    pub dfs_base: String,
    pub workspace_id: String,
    pub lakehouse_id: String,
    pub timeout: Duration,
}

impl Default for OneLakeSettings {
    fn default() -> Self {
        Self {
            dfs_base: DEFAULT_DFS_BASE.to_string(),
            workspace_id: String::new(),
            lakehouse_id: String::new(),
            timeout: DEFAULT_ARTIFACT_TIMEOUT,
        }
    }
}

/// [`ArtifactReader`] over the OneLake DFS endpoint.
pub struct OneLakeArtifactReader {
    http: reqwest::Client,
    settings: OneLakeSettings,
    tokens: Arc<dyn TokenSource>,
}

impl OneLakeArtifactReader {
    pub fn new(settings: OneLakeSettings, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            tokens,
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.settings.dfs_base.trim_end_matches('/'),
            self.settings.workspace_id,
            self.settings.lakehouse_id,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ArtifactReader for OneLakeArtifactReader {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let token = self.tokens.bearer_token()?;
        let transport = |e: reqwest::Error| ArtifactError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        };

        let response = self
            .http
            .get(self.url_for(path))
            .bearer_auth(token)
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(transport)?;
                debug!(path, size = bytes.len(), "Artifact read");
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => {
                debug!(path, "Artifact not found");
                Ok(None)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(path, status = status.as_u16(), "Failed to read artifact");
                Err(ArtifactError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                    body: truncate_body(&body, 200),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticToken;
    use std::collections::HashMap;

    struct MapReader(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl ArtifactReader for MapReader {
        async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
            Ok(self.0.get(path).cloned())
        }
    }

    #[test]
    fn test_paths() {
        let run_id = RunId::parse("0b5b8f0e-4c1e-4a57-9d4b-3f8a1f0c2d11").unwrap();
        assert_eq!(
            paths::run_kpis(&run_id),
            "Files/results/runs/0b5b8f0e-4c1e-4a57-9d4b-3f8a1f0c2d11/kpis.json"
        );
        assert!(paths::run_metadata(&run_id).ends_with("/run_metadata.json"));
    }

    #[test]
    fn test_url_for() {
        let reader = OneLakeArtifactReader::new(
            OneLakeSettings {
                dfs_base: "https://dfs.example/".into(),
                workspace_id: "ws".into(),
                lakehouse_id: "lh".into(),
                ..OneLakeSettings::default()
            },
            Arc::new(StaticToken::missing("storage")),
        );
        assert_eq!(
            reader.url_for(paths::CURRENT_KPIS),
            "https://dfs.example/ws/lh/Files/results/current/kpis.json"
        );
    }

    #[tokio::test]
    async fn test_run_kpis_fall_back_to_current() {
        let run_id = RunId::new();
        let mut files = HashMap::new();
        files.insert(paths::CURRENT_KPIS.to_string(), br#"{"rows": 3}"#.to_vec());
        let reader = MapReader(files);

        let fetched = fetch_run_kpis(&reader, &run_id).await.unwrap().unwrap();
        assert_eq!(fetched.path, paths::CURRENT_KPIS);
        assert_eq!(fetched.value["rows"], 3);

        let mut files = HashMap::new();
        files.insert(paths::run_kpis(&run_id), br#"{"rows": 5}"#.to_vec());
        files.insert(paths::CURRENT_KPIS.to_string(), br#"{"rows": 3}"#.to_vec());
        let fetched = fetch_run_kpis(&MapReader(files), &run_id).await.unwrap().unwrap();
        assert_eq!(fetched.value["rows"], 5);

        assert!(fetch_run_kpis(&MapReader(HashMap::new()), &run_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_read_json_rejects_garbage() {
        let mut files = HashMap::new();
        files.insert("x.json".to_string(), b"not json".to_vec());
        let err = MapReader(files).read_json("x.json").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed { .. }));
    }
}
