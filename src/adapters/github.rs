//! GitHub Actions workflow client.
//!
//! Endpoints:
//! - POST /repos/{repo}/actions/workflows/{workflow}/dispatches
//! - GET  /repos/{repo}/actions/runs/{run_id}
//!
//! Auth: Bearer token

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{DispatchRequest, WorkflowError, WorkflowService};
use crate::domain::{RemoteRunId, RunStatus};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_WEB_URL: &str = "https://github.com";

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Per-request limit for API calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Names of the workflow inputs carrying the run id and artifact URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputNames {
    pub run_id: String,
    pub artifact_url: String,
}

impl Default for InputNames {
    fn default() -> Self {
        Self {
            run_id: "test_run_id".to_string(),
            artifact_url: "build_file_url".to_string(),
        }
    }
}

/// Body of a workflow_dispatch request
#[derive(Debug, Serialize)]
struct DispatchPayload<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: serde_json::Map<String, serde_json::Value>,
}

/// GitHub Actions client for one repository workflow
pub struct GitHubWorkflows {
    api_url: String,
    web_url: String,
    repo: String,
    workflow: String,
    token: String,
    inputs: InputNames,
    client: reqwest::Client,
}

impl fmt::Debug for GitHubWorkflows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubWorkflows")
            .field("api_url", &self.api_url)
            .field("repo", &self.repo)
            .field("workflow", &self.workflow)
            .field("token", &"***")
            .finish()
    }
}

impl GitHubWorkflows {
    /// Create a client for `repo` (`owner/name`) and `workflow` (numeric id
    /// or workflow file name)
    pub fn new(
        repo: impl Into<String>,
        workflow: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            api_url: DEFAULT_API_URL.to_string(),
            web_url: DEFAULT_WEB_URL.to_string(),
            repo: repo.into(),
            workflow: workflow.into(),
            token: token.into(),
            inputs: InputNames::default(),
            client,
        })
    }

    /// Point at a different API host (GitHub Enterprise)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        self.web_url = web_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_input_names(mut self, inputs: InputNames) -> Self {
        self.inputs = inputs;
        self
    }

    fn dispatch_url(&self) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            self.api_url, self.repo, self.workflow
        )
    }

    fn run_api_url(&self, id: &RemoteRunId) -> String {
        format!("{}/repos/{}/actions/runs/{}", self.api_url, self.repo, id)
    }

    fn payload<'a>(&self, request: &'a DispatchRequest) -> DispatchPayload<'a> {
        let mut inputs = serde_json::Map::new();
        inputs.insert(
            self.inputs.run_id.clone(),
            serde_json::Value::String(request.run_id.clone()),
        );
        inputs.insert(
            self.inputs.artifact_url.clone(),
            serde_json::Value::String(request.artifact_url.clone()),
        );
        DispatchPayload {
            git_ref: &request.branch,
            inputs,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", concat!("e2e-relay/", env!("CARGO_PKG_VERSION")))
    }
}

#[async_trait]
impl WorkflowService for GitHubWorkflows {
    fn name(&self) -> &str {
        "github"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkflowError> {
        let url = self.dispatch_url();
        debug!(%url, branch = %request.branch, "Dispatching workflow");

        let response = self
            .authorized(self.client.post(&url))
            .json(&self.payload(request))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            // 204 No Content is the documented answer
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(WorkflowError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn get_run(&self, id: &RemoteRunId) -> Result<RunStatus, WorkflowError> {
        let response = self
            .authorized(self.client.get(self.run_api_url(id)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WorkflowError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<RunStatus>().await?)
    }

    fn run_url(&self, id: &RemoteRunId) -> Option<String> {
        Some(format!("{}/{}/actions/runs/{}", self.web_url, self.repo, id))
    }
}
