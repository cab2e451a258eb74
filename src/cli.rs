use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

use crate::auth::{AuthMethod, Token};
use crate::cache::ResultCache;
use crate::client::GitLabClient;
use crate::error::CidashError;
use crate::metrics::process_ci_metrics;
use crate::namespaces::{FetchOptions, NamespaceEnumerator, NAMESPACE_CACHE_TTL};
use crate::pipelines::{fetch_pipelines_for_projects, fetch_projects};
use crate::timerange::{DateRange, TimeRange};

#[derive(Parser)]
#[command(name = "cidash")]
#[command(author, version, about = "GitLab CI build metrics aggregator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate pipeline history for a namespace into build metrics
    Metrics {
        /// GitLab personal access token
        #[arg(short, long, env = "GITLAB_TOKEN")]
        token: String,

        /// GitLab instance URL
        #[arg(short, long, default_value = "https://gitlab.com")]
        url: String,

        /// Namespace (group) whose projects to aggregate
        #[arg(short, long)]
        namespace: String,

        /// Lookback window for pipeline history
        #[arg(short = 'r', long, value_enum, default_value_t = TimeRange::Month)]
        time_range: TimeRange,
    },

    /// List the groups the token can access
    Namespaces {
        /// GitLab personal access token
        #[arg(short, long, env = "GITLAB_TOKEN")]
        token: String,

        /// GitLab instance URL
        #[arg(short, long, default_value = "https://gitlab.com")]
        url: String,

        /// Bypass the namespace cache
        #[arg(short, long, default_value_t = false)]
        force_refresh: bool,

        /// Wall-clock budget in seconds before partial results are returned
        #[arg(long, default_value_t = 25)]
        budget_secs: u64,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Metrics {
                token,
                url,
                namespace,
                time_range,
            } => {
                require_non_empty(token, "personal access token")?;
                require_non_empty(namespace, "namespace")?;

                info!("Aggregating CI metrics for namespace: {namespace}");

                let client = GitLabClient::new(url, Token::from(token.as_str()), AuthMethod::Pat)?;
                let range = DateRange::for_range(*time_range);

                let projects = fetch_projects(&client, Some(namespace)).await?;
                if projects.is_empty() {
                    return Err(CidashError::NoProjects.into());
                }

                let bundles = fetch_pipelines_for_projects(&client, &projects, &range).await;
                let metrics = process_ci_metrics(&bundles, *time_range);

                self.write_json(&metrics)
            }
            Commands::Namespaces {
                token,
                url,
                force_refresh,
                budget_secs,
            } => {
                require_non_empty(token, "personal access token")?;

                info!("Fetching accessible namespaces from {url}");

                let client = GitLabClient::new(url, Token::from(token.as_str()), AuthMethod::Pat)?;
                let cache = Arc::new(ResultCache::new(NAMESPACE_CACHE_TTL));
                let enumerator = NamespaceEnumerator::new(client, cache);

                let listing = enumerator
                    .list(&FetchOptions {
                        force_refresh: *force_refresh,
                        budget: Duration::from_secs(*budget_secs),
                    })
                    .await?;

                let response = serde_json::json!({
                    "namespaces": listing.namespaces,
                    "fromCache": listing.from_cache,
                    "complete": listing.complete,
                    "timestamp": Utc::now().to_rfc3339(),
                });
                self.write_json(&response)
            }
        }
    }

    fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Results written to: {}", output_path.display());
        } else {
            println!("{}", json_output);
        }

        Ok(())
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<(), CidashError> {
    if value.trim().is_empty() {
        return Err(CidashError::Validation(format!("Valid {field} is required")));
    }
    Ok(())
}
