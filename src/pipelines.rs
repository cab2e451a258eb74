use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{info, warn};

use crate::client::GitLabClient;
use crate::error::Result;
use crate::timerange::DateRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

/// One successfully fetched pipeline with its job durations rolled up.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub id: u64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub total_duration_minutes: f64,
}

/// All pipelines fetched for one project within the date range. A project
/// whose fetches failed still gets a bundle, just an empty one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPipelines {
    pub project_id: u64,
    pub project_name: String,
    pub pipelines: Vec<PipelineRecord>,
}

fn placeholder_name(project_id: u64) -> String {
    format!("Project {project_id}")
}

/// Lists the projects visible to the token, optionally scoped to a
/// namespace. Rows without an id are dropped; they cannot be queried for
/// pipelines.
pub async fn fetch_projects(
    client: &GitLabClient,
    namespace: Option<&str>,
) -> Result<Vec<Project>> {
    let dtos = client.fetch_projects(namespace).await?;
    let total = dtos.len();

    let projects: Vec<Project> = dtos
        .into_iter()
        .filter_map(|dto| {
            let id = dto.id?;
            Some(Project {
                id,
                name: dto.name.unwrap_or_else(|| placeholder_name(id)),
            })
        })
        .collect();

    info!("Processing {} valid projects out of {total} total", projects.len());
    Ok(projects)
}

/// Fans out per-project pipeline fetches concurrently. Failures never
/// escape this layer: a failed pipeline is dropped, a failed project
/// degrades to an empty bundle.
pub async fn fetch_pipelines_for_projects(
    client: &GitLabClient,
    projects: &[Project],
    range: &DateRange,
) -> Vec<ProjectPipelines> {
    let fetches = projects
        .iter()
        .map(|project| fetch_project_pipelines(client, project, range));
    join_all(fetches).await
}

async fn fetch_project_pipelines(
    client: &GitLabClient,
    project: &Project,
    range: &DateRange,
) -> ProjectPipelines {
    // Resolve the display name from the project detail, falling back to a
    // synthesized one so the bundle is always well-formed.
    let project_name = match client.fetch_project(project.id).await {
        Ok(dto) => dto.name.unwrap_or_else(|| placeholder_name(project.id)),
        Err(err) => {
            warn!("Error fetching project {}: {err}", project.id);
            return ProjectPipelines {
                project_id: project.id,
                project_name: placeholder_name(project.id),
                pipelines: Vec::new(),
            };
        }
    };

    let pipeline_list = match client.fetch_pipelines(project.id, range).await {
        Ok(list) => list,
        Err(err) => {
            warn!("Error fetching pipelines for project {}: {err}", project.id);
            return ProjectPipelines {
                project_id: project.id,
                project_name,
                pipelines: Vec::new(),
            };
        }
    };

    let details = pipeline_list
        .iter()
        .map(|pipeline| fetch_pipeline_record(client, project.id, pipeline.id));
    let pipelines: Vec<PipelineRecord> = join_all(details).await.into_iter().flatten().collect();

    ProjectPipelines {
        project_id: project.id,
        project_name,
        pipelines,
    }
}

/// Fetches one pipeline's detail and jobs, summing job seconds into
/// minutes. Any failure drops this pipeline only.
async fn fetch_pipeline_record(
    client: &GitLabClient,
    project_id: u64,
    pipeline_id: u64,
) -> Option<PipelineRecord> {
    let detail = match client.fetch_pipeline(project_id, pipeline_id).await {
        Ok(detail) => detail,
        Err(err) => {
            warn!("Error fetching details for pipeline {pipeline_id}: {err}");
            return None;
        }
    };

    let jobs = match client.fetch_pipeline_jobs(project_id, pipeline_id).await {
        Ok(jobs) => jobs,
        Err(err) => {
            warn!("Error fetching jobs for pipeline {pipeline_id}: {err}");
            return None;
        }
    };

    let total_duration_minutes = jobs
        .iter()
        .filter_map(|job| job.duration)
        .map(|seconds| seconds / 60.0)
        .sum();

    Some(PipelineRecord {
        id: detail.id,
        status: detail.status.unwrap_or_else(|| "other".to_string()),
        created_at: detail.created_at,
        total_duration_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthMethod, Token};
    use crate::timerange::TimeRange;
    use chrono::NaiveDate;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> GitLabClient {
        GitLabClient::new(&server.url(), Token::from("glpat-test-token"), AuthMethod::Pat)
            .unwrap()
    }

    fn month_range() -> DateRange {
        DateRange::compute(
            TimeRange::Month,
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
        )
    }

    fn pipeline_detail(id: u64, status: &str) -> String {
        format!(r#"{{"id":{id},"status":"{status}","created_at":"2025-06-10T08:00:00Z"}}"#)
    }

    #[tokio::test]
    async fn test_fetch_projects_drops_rows_without_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id":1,"name":"api"},{"name":"orphan"},{"id":2,"name":null}]"#)
            .create_async()
            .await;

        let projects = fetch_projects(&client_for(&server), None).await.unwrap();

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "api");
        assert_eq!(projects[1].name, "Project 2");
    }

    #[tokio::test]
    async fn test_fetch_projects_passes_namespace_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/projects")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("membership".into(), "true".into()),
                Matcher::UrlEncoded("namespace".into(), "my-group".into()),
            ]))
            .with_body("[]")
            .create_async()
            .await;

        let projects = fetch_projects(&client_for(&server), Some("my-group"))
            .await
            .unwrap();

        assert!(projects.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_job_durations_summed_into_minutes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/5")
            .with_body(r#"{"id":5,"name":"api"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/5/pipelines")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id":11}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/5/pipelines/11")
            .with_body(pipeline_detail(11, "success"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/5/pipelines/11/jobs")
            .with_body(r#"[{"duration":600.0},{"duration":300.0},{"duration":null}]"#)
            .create_async()
            .await;

        let projects = vec![Project {
            id: 5,
            name: "api".into(),
        }];
        let bundles =
            fetch_pipelines_for_projects(&client_for(&server), &projects, &month_range()).await;

        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].project_name, "api");
        assert_eq!(bundles[0].pipelines.len(), 1);
        assert_eq!(bundles[0].pipelines[0].total_duration_minutes, 15.0);
    }

    #[tokio::test]
    async fn test_failed_pipeline_dropped_but_siblings_survive() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/5")
            .with_body(r#"{"id":5,"name":"api"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/5/pipelines")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id":11},{"id":12},{"id":13}]"#)
            .create_async()
            .await;
        for id in [11u64, 12, 13] {
            server
                .mock("GET", format!("/api/v4/projects/5/pipelines/{id}").as_str())
                .with_body(pipeline_detail(id, "success"))
                .create_async()
                .await;
        }
        for id in [11u64, 13] {
            server
                .mock(
                    "GET",
                    format!("/api/v4/projects/5/pipelines/{id}/jobs").as_str(),
                )
                .with_body(r#"[{"duration":60.0}]"#)
                .create_async()
                .await;
        }
        // Job fetch for pipeline 12 fails.
        server
            .mock("GET", "/api/v4/projects/5/pipelines/12/jobs")
            .with_status(500)
            .create_async()
            .await;

        let projects = vec![Project {
            id: 5,
            name: "api".into(),
        }];
        let bundles =
            fetch_pipelines_for_projects(&client_for(&server), &projects, &month_range()).await;

        let ids: Vec<u64> = bundles[0].pipelines.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![11, 13]);
    }

    #[tokio::test]
    async fn test_failed_project_degrades_to_empty_bundle() {
        let mut server = mockito::Server::new_async().await;
        // Project 5's detail fetch fails outright.
        server
            .mock("GET", "/api/v4/projects/5")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/6")
            .with_body(r#"{"id":6,"name":"web"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/6/pipelines")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let projects = vec![
            Project {
                id: 5,
                name: "api".into(),
            },
            Project {
                id: 6,
                name: "web".into(),
            },
        ];
        let bundles =
            fetch_pipelines_for_projects(&client_for(&server), &projects, &month_range()).await;

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].project_name, "Project 5");
        assert!(bundles[0].pipelines.is_empty());
        assert_eq!(bundles[1].project_name, "web");
    }
}
