//! Fabric item-jobs REST client.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{JobClient, JobHandle, JobRequest, PipelineTarget, PollResult};
use crate::error::{truncate_body, PollError, SubmissionError, ERROR_BODY_LIMIT};
use crate::token::TokenSource;

pub const DEFAULT_API_BASE: &str = "https://api.fabric.microsoft.com/v1";
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates of the pipeline and the identity jobs run as.
#[derive(Debug, Clone)]
pub struct FabricSettings {
    pub api_base: String,
    pub workspace_id: String,
    pub pipeline_item_id: String,
    pub owner_upn: String,
    pub owner_object_id: String,
    pub submit_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for FabricSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            workspace_id: String::new(),
            pipeline_item_id: String::new(),
            owner_upn: String::new(),
            owner_object_id: String::new(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// [`JobClient`] backed by the Fabric jobs API.
pub struct FabricJobClient {
    http: reqwest::Client,
    settings: FabricSettings,
    tokens: Arc<dyn TokenSource>,
}

impl FabricJobClient {
    pub fn new(settings: FabricSettings, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            tokens,
        }
    }

    /// The job-instances endpoint of the configured pipeline.
    pub fn submit_url(&self) -> String {
        format!(
            "{}/workspaces/{}/items/{}/jobs/instances?jobType=Pipeline",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.workspace_id,
            self.settings.pipeline_item_id
        )
    }

    fn payload(&self, request: &JobRequest) -> Value {
        let mut parameters = json!({
            "input_file": request.input.input_file(),
            "run_id": request.run_id.as_str(),
            "requested_by": request.requested_by,
        });
        if let Some(source) = request.input.restore_source() {
            parameters["restore_from_run_id"] = json!(source.as_str());
        }

        json!({
            "executionData": {
                "OwnerUserPrincipalName": self.settings.owner_upn,
                "OwnerUserObjectId": self.settings.owner_object_id,
                "parameters": parameters,
            }
        })
    }
}

#[async_trait]
impl JobClient for FabricJobClient {
    fn target(&self) -> PipelineTarget {
        PipelineTarget {
            workspace_id: self.settings.workspace_id.clone(),
            pipeline_item_id: self.settings.pipeline_item_id.clone(),
        }
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, SubmissionError> {
        let token = self.tokens.bearer_token()?;
        let url = self.submit_url();
        debug!(run_id = %request.run_id, url = %url, "Submitting pipeline job");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .timeout(self.settings.submit_timeout)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body, ERROR_BODY_LIMIT),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if location.is_empty() {
            // The job is running regardless; the run just cannot be polled.
            warn!(run_id = %request.run_id, "Pipeline accepted without a Location header");
        } else {
            info!(run_id = %request.run_id, location = %location, "Pipeline triggered");
        }
        Ok(JobHandle::new(location))
    }

    async fn poll(&self, handle: &str) -> Result<PollResult, PollError> {
        if handle.trim().is_empty() {
            return Err(PollError::MissingHandle);
        }
        let token = self.tokens.bearer_token()?;

        let response = self
            .http
            .get(handle)
            .bearer_auth(token)
            .timeout(self.settings.poll_timeout)
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        interpret_poll_response(status, &body)
    }
}

/// Turn a raw poll response into a [`PollResult`].
///
/// 200 must carry a JSON body; its `status` defaults to `Unknown`. 202 means
/// the job is still working: the body is optional and its `status`, if any,
/// wins over `InProgress`. Every other code is a poll failure.
pub fn interpret_poll_response(http_status: u16, body: &str) -> Result<PollResult, PollError> {
    let (parsed, default_status) = match http_status {
        200 => {
            let parsed: Value =
                serde_json::from_str(body).map_err(|e| PollError::Malformed(e.to_string()))?;
            (parsed, "Unknown")
        }
        202 => (serde_json::from_str(body).unwrap_or(Value::Null), "InProgress"),
        _ => {
            return Err(PollError::Status {
                status: http_status,
                body: truncate_body(body, ERROR_BODY_LIMIT),
            })
        }
    };

    let status = parsed
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or(default_status)
        .to_string();
    let job_id = parsed.get("id").and_then(Value::as_str).map(str::to_string);

    Ok(PollResult {
        status,
        job_id,
        http_status,
        body: parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InputReference;
    use crate::token::StaticToken;
    use portal_ids::RunId;

    fn client() -> FabricJobClient {
        FabricJobClient::new(
            FabricSettings {
                api_base: "https://api.example/v1/".into(),
                workspace_id: "ws-1".into(),
                pipeline_item_id: "pipe-1".into(),
                owner_upn: "owner@example.com".into(),
                owner_object_id: "oid-1".into(),
                ..FabricSettings::default()
            },
            Arc::new(StaticToken::new("api", "t")),
        )
    }

    #[test]
    fn test_submit_url() {
        assert_eq!(
            client().submit_url(),
            "https://api.example/v1/workspaces/ws-1/items/pipe-1/jobs/instances?jobType=Pipeline"
        );
    }

    #[test]
    fn test_payload_for_file_and_restore() {
        let client = client();
        let run_id = RunId::new();
        let payload = client.payload(&JobRequest {
            run_id: run_id.clone(),
            input: InputReference::file("orders.csv"),
            requested_by: "alice".into(),
        });
        let params = &payload["executionData"]["parameters"];
        assert_eq!(params["input_file"], "orders.csv");
        assert_eq!(params["run_id"], run_id.as_str());
        assert_eq!(params["requested_by"], "alice");
        assert!(params.get("restore_from_run_id").is_none());
        assert_eq!(payload["executionData"]["OwnerUserPrincipalName"], "owner@example.com");

        let source = RunId::new();
        let payload = client.payload(&JobRequest {
            run_id,
            input: InputReference::Restore {
                source_run_id: source.clone(),
            },
            requested_by: "bob".into(),
        });
        let params = &payload["executionData"]["parameters"];
        assert_eq!(params["input_file"], "__RESTORE__");
        assert_eq!(params["restore_from_run_id"], source.as_str());
    }

    #[test]
    fn test_interpret_ok_body() {
        let result = interpret_poll_response(200, r#"{"id": "job-9", "status": "Completed"}"#).unwrap();
        assert_eq!(result.status, "Completed");
        assert_eq!(result.job_id.as_deref(), Some("job-9"));

        let result = interpret_poll_response(200, "{}").unwrap();
        assert_eq!(result.status, "Unknown");
        assert!(result.job_id.is_none());
    }

    #[test]
    fn test_interpret_accepted() {
        assert_eq!(interpret_poll_response(202, "").unwrap().status, "InProgress");
        assert_eq!(
            interpret_poll_response(202, r#"{"status": "NotStarted"}"#)
                .unwrap()
                .status,
            "NotStarted"
        );
    }

    #[test]
    fn test_interpret_failures() {
        assert!(matches!(
            interpret_poll_response(200, "<html>"),
            Err(PollError::Malformed(_))
        ));
        assert_eq!(
            interpret_poll_response(404, "gone"),
            Err(PollError::Status {
                status: 404,
                body: "gone".into()
            })
        );
    }

    #[tokio::test]
    async fn test_empty_handle_is_rejected_before_any_request() {
        assert_eq!(client().poll("  ").await, Err(PollError::MissingHandle));
    }
}
