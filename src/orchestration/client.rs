//! Azure Data Factory management client
//!
//! Thin wrapper over the factory-scoped REST operations this service needs.
//! Requests are authenticated with [`AzureCredential`]; nothing is retried.

use super::credential::AzureCredential;
use super::types::{PipelineRun, RunParameters, RunStatus, RunWindow};
use super::{OrchestrationError, PipelineOrchestrator};
use crate::config::DataFactoryConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const API_VERSION: &str = "2018-06-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on `queryPipelineRuns` pages followed for one query
const MAX_QUERY_PAGES: usize = 100;

/// Client bound to a single data factory
pub struct DataFactoryClient {
    http: reqwest::Client,
    credential: AzureCredential,
    factory_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRunResponse {
    run_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRunResource {
    run_id: String,
    pipeline_name: String,
    status: RunStatus,
    run_start: Option<DateTime<Utc>>,
    run_end: Option<DateTime<Utc>>,
    duration_in_ms: Option<i64>,
    message: Option<String>,
}

impl From<PipelineRunResource> for PipelineRun {
    fn from(run: PipelineRunResource) -> Self {
        Self {
            run_id: run.run_id,
            pipeline_name: run.pipeline_name,
            status: run.status,
            start_time: run.run_start,
            end_time: run.run_end,
            duration_ms: run.duration_in_ms,
            message: run.message.filter(|m| !m.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunFilterParameters<'a> {
    last_updated_after: DateTime<Utc>,
    last_updated_before: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRunsQueryResponse {
    #[serde(default)]
    value: Vec<PipelineRunResource>,
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloudErrorBody {
    error: CloudError,
}

#[derive(Debug, Deserialize)]
struct CloudError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl DataFactoryClient {
    /// Create a client for the factory described by `config`
    pub fn new(config: &DataFactoryConfig, credential: AzureCredential) -> Result<Self, OrchestrationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let factory_url = factory_url(config)?;
        info!("Data Factory client targeting {}", factory_url);

        Ok(Self {
            http,
            credential,
            factory_url,
        })
    }

    /// Factory URL extended with `segments` and the API version
    fn endpoint(&self, segments: &[&str]) -> Result<Url, OrchestrationError> {
        let mut url = self.factory_url.clone();
        url.path_segments_mut()
            .map_err(|_| OrchestrationError::InvalidResponse("management endpoint cannot be a base URL".to_string()))?
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, OrchestrationError> {
        let token = self.credential.token(&self.http).await?;
        Ok(self.http.post(url).bearer_auth(token).json(body).send().await?)
    }
}

#[async_trait]
impl PipelineOrchestrator for DataFactoryClient {
    async fn create_run(
        &self,
        pipeline_name: &str,
        parameters: &RunParameters,
    ) -> Result<String, OrchestrationError> {
        info!("Triggering pipeline: {}", pipeline_name);

        let url = self.endpoint(&["pipelines", pipeline_name, "createRun"])?;
        let response = self.post_json(url, parameters).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OrchestrationError::PipelineNotFound(pipeline_name.to_string()));
        }
        let created: CreateRunResponse = read_json(response).await?;

        info!("Pipeline run started with ID: {}", created.run_id);
        Ok(created.run_id)
    }

    async fn get_run(&self, run_id: &str) -> Result<PipelineRun, OrchestrationError> {
        let url = self.endpoint(&["pipelineruns", run_id])?;
        let token = self.credential.token(&self.http).await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OrchestrationError::RunNotFound(run_id.to_string()));
        }
        let run: PipelineRunResource = read_json(response).await?;
        Ok(run.into())
    }

    async fn query_runs(&self, window: RunWindow) -> Result<Vec<PipelineRun>, OrchestrationError> {
        let mut runs = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0;

        loop {
            let filter = RunFilterParameters {
                last_updated_after: window.updated_after,
                last_updated_before: window.updated_before,
                continuation_token: continuation.as_deref(),
            };
            let url = self.endpoint(&["queryPipelineRuns"])?;
            let page: PipelineRunsQueryResponse = read_json(self.post_json(url, &filter).await?).await?;
            pages += 1;

            runs.extend(page.value.into_iter().map(PipelineRun::from));
            match page.continuation_token.filter(|t| !t.is_empty()) {
                Some(token) if continuation.as_deref() == Some(token.as_str()) => {
                    return Err(OrchestrationError::InvalidResponse(format!(
                        "continuation token '{}' returned twice",
                        token
                    )));
                }
                Some(_) if pages >= MAX_QUERY_PAGES => {
                    return Err(OrchestrationError::InvalidResponse(format!(
                        "pipeline run query exceeded {} pages",
                        MAX_QUERY_PAGES
                    )));
                }
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!("Found {} pipeline runs in window", runs.len());
        Ok(runs)
    }
}

fn factory_url(config: &DataFactoryConfig) -> Result<Url, OrchestrationError> {
    let mut url = Url::parse(&config.management_endpoint)
        .map_err(|e| OrchestrationError::InvalidResponse(format!("invalid management endpoint: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| OrchestrationError::InvalidResponse("management endpoint cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend([
            "subscriptions",
            config.subscription_id.as_str(),
            "resourceGroups",
            config.resource_group.as_str(),
            "providers",
            "Microsoft.DataFactory",
            "factories",
            config.factory_name.as_str(),
        ]);
    Ok(url)
}

/// Decode a success body or turn an ARM error envelope into `OrchestrationError::Api`
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, OrchestrationError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| OrchestrationError::InvalidResponse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<CloudErrorBody>(&body) {
        Ok(envelope) => format!("{}: {}", envelope.error.code, envelope.error.message),
        Err(_) => body,
    };
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(OrchestrationError::Auth(message));
    }
    Err(OrchestrationError::Api {
        status: status.as_u16(),
        message,
    })
}
