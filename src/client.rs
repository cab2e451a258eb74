use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::auth::{AuthMethod, Token};
use crate::error::{CidashError, Result};
use crate::timerange::DateRange;

/// Quick reachability probes fail fast; paginated group listings get a
/// little longer; pipeline/job fetches tolerate the slowest responses.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const GROUPS_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
pub struct GitLabVersionDto {
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabGroupDto {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub full_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProjectDto {
    pub id: Option<u64>,
    pub name: Option<String>,
}

impl GitLabProjectDto {
    /// Projects without an id cannot participate in pipeline fetches.
    pub fn is_valid(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct GitLabPipelineListDto {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct GitLabPipelineDetailDto {
    pub id: u64,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct GitLabJobDto {
    pub duration: Option<f64>,
}

/// Pagination info read from GitLab's `x-total-pages`/`x-total` headers.
#[derive(Debug, Clone, Copy)]
pub struct PageInfo {
    pub total_pages: u32,
    pub total: u64,
}

pub struct GitLabClient {
    client: Client,
    base_url: Url,
    api_url: Url,
    token: Token,
    auth: AuthMethod,
}

/// Strips any path component, keeping only `scheme://host[:port]`.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(CidashError::Validation(
            "GitLab URL must start with http:// or https://".into(),
        ));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| CidashError::Validation(format!("Invalid GitLab URL: {e}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| CidashError::Validation("GitLab URL has no host".into()))?;

    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };

    Url::parse(&origin).map_err(|e| CidashError::Validation(format!("Invalid GitLab URL: {e}")))
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Token, auth: AuthMethod) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cidash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CidashError::Validation(format!("Failed to create HTTP client: {e}")))?;

        let base_url = normalize_base_url(base_url)?;
        let api_url = base_url
            .join("api/v4/")
            .map_err(|e| CidashError::Validation(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_url,
            token,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| CidashError::Validation(format!("Invalid endpoint URL: {e}")))
    }

    fn get(&self, url: Url, timeout: Duration) -> reqwest::RequestBuilder {
        let request = self.client.get(url).timeout(timeout);
        self.auth.apply(request, &self.token)
    }

    /// Sends a request, classifying failures into the error taxonomy:
    /// connection failures, timeouts, rate limits, and upstream API errors
    /// with the server's message passed through.
    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CidashError::Timeout(context.to_string())
            } else if e.is_connect() {
                CidashError::Unreachable(e.to_string())
            } else {
                CidashError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CidashError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        Err(CidashError::Api {
            status: status.as_u16(),
            message: extract_upstream_message(&body),
        })
    }

    /// Cheap reachability probe, used to fail fast before paginated work.
    pub async fn check_version(&self) -> Result<GitLabVersionDto> {
        let url = self.endpoint("version")?;
        let response = self.send(self.get(url, PROBE_TIMEOUT), "version check").await?;
        Ok(response.json().await?)
    }

    /// Fetches one page of groups the caller has Reporter-level access to,
    /// along with the pagination headers needed to plan remaining pages.
    pub async fn fetch_groups_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<GitLabGroupDto>, PageInfo)> {
        let url = self.endpoint("groups")?;
        let request = self
            .get(url, GROUPS_TIMEOUT)
            .query(&[("min_access_level", "20"), ("simple", "true")])
            .query(&[("per_page", per_page), ("page", page)]);

        let response = self.send(request, "group listing").await?;

        let total_pages = header_number(&response, "x-total-pages").unwrap_or(1) as u32;
        let total = header_number(&response, "x-total");

        let groups: Vec<GitLabGroupDto> = response.json().await?;
        let page_info = PageInfo {
            total_pages,
            total: total.unwrap_or(groups.len() as u64),
        };
        debug!("Fetched groups page {page}: {} groups", groups.len());

        Ok((groups, page_info))
    }

    /// Lists projects the token's identity is a member of, optionally
    /// scoped to a namespace. A response that is not an array is coerced
    /// to an empty list rather than treated as an error.
    pub async fn fetch_projects(&self, namespace: Option<&str>) -> Result<Vec<GitLabProjectDto>> {
        let url = self.endpoint("projects")?;
        let mut request = self
            .get(url, DEFAULT_TIMEOUT)
            .query(&[("membership", "true"), ("per_page", "100")]);
        if let Some(namespace) = namespace {
            request = request.query(&[("namespace", namespace)]);
        }

        let response = self.send(request, "project listing").await?;
        let body: serde_json::Value = response.json().await?;

        let rows = match body {
            serde_json::Value::Array(rows) => rows,
            serde_json::Value::Object(mut obj) => match obj.remove("projects") {
                Some(serde_json::Value::Array(rows)) => rows,
                _ => {
                    debug!("Projects response is not an array, coercing to empty list");
                    Vec::new()
                }
            },
            _ => {
                debug!("Projects response is not an array, coercing to empty list");
                Vec::new()
            }
        };

        let projects = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<GitLabProjectDto>(row).ok())
            .collect();
        Ok(projects)
    }

    /// Project detail lookup, used to resolve display names.
    pub async fn fetch_project(&self, project_id: u64) -> Result<GitLabProjectDto> {
        let url = self.endpoint(&format!("projects/{project_id}"))?;
        let response = self
            .send(self.get(url, DEFAULT_TIMEOUT), "project detail")
            .await?;
        Ok(response.json().await?)
    }

    /// Pipelines updated within the date range, newest first.
    pub async fn fetch_pipelines(
        &self,
        project_id: u64,
        range: &DateRange,
    ) -> Result<Vec<GitLabPipelineListDto>> {
        let url = self.endpoint(&format!("projects/{project_id}/pipelines"))?;
        let request = self.get(url, DEFAULT_TIMEOUT).query(&[
            ("updated_after", range.start_str().as_str()),
            ("updated_before", range.end_str().as_str()),
            ("per_page", "100"),
        ]);

        let response = self.send(request, "pipeline listing").await?;
        Ok(response.json().await?)
    }

    pub async fn fetch_pipeline(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<GitLabPipelineDetailDto> {
        let url = self.endpoint(&format!("projects/{project_id}/pipelines/{pipeline_id}"))?;
        let response = self
            .send(self.get(url, DEFAULT_TIMEOUT), "pipeline detail")
            .await?;
        Ok(response.json().await?)
    }

    pub async fn fetch_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<Vec<GitLabJobDto>> {
        let url =
            self.endpoint(&format!("projects/{project_id}/pipelines/{pipeline_id}/jobs"))?;
        let response = self
            .send(self.get(url, DEFAULT_TIMEOUT), "pipeline jobs")
            .await?;
        Ok(response.json().await?)
    }
}

fn header_number(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// GitLab error bodies carry the useful text under `message` or `error`;
/// fall back to the raw body so nothing is swallowed.
fn extract_upstream_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }
    body.to_string()
}
