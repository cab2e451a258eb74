use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};

use crate::cache::ResultCache;
use crate::client::{GitLabClient, GitLabGroupDto};
use crate::error::{CidashError, Result};
use crate::retry::RetryPolicy;

const PER_PAGE: u32 = 100;
/// Hard cap on pages fetched per request; instances with more groups get
/// the first N pages flagged incomplete instead of an unbounded crawl.
const MAX_PAGES: u32 = 10;
const MAX_CONCURRENT: usize = 3;

pub const NAMESPACE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(25);

/// A group the authenticated identity can read at Reporter level or above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub kind: String,
    pub full_path: String,
}

impl From<GitLabGroupDto> for Namespace {
    fn from(group: GitLabGroupDto) -> Self {
        let full_path = group.full_path.unwrap_or_else(|| group.path.clone());
        Self {
            id: group.id,
            name: group.name,
            path: group.path,
            kind: "group".to_string(),
            full_path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceListing {
    pub namespaces: Vec<Namespace>,
    pub complete: bool,
    #[serde(rename = "fromCache")]
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force_refresh: bool,
    /// Wall-clock budget for the whole listing, independent of per-call
    /// timeouts. On expiry whatever has accumulated is returned as partial.
    pub budget: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            budget: DEFAULT_BUDGET,
        }
    }
}

pub struct NamespaceEnumerator {
    client: GitLabClient,
    cache: Arc<ResultCache<Vec<Namespace>>>,
    retry: RetryPolicy,
}

impl NamespaceEnumerator {
    pub fn new(client: GitLabClient, cache: Arc<ResultCache<Vec<Namespace>>>) -> Self {
        Self {
            client,
            cache,
            retry: RetryPolicy::default(),
        }
    }

    fn cache_key(&self) -> String {
        format!(
            "{}_{}",
            self.client.base_url(),
            self.client.token().cache_prefix()
        )
    }

    /// Lists all accessible groups, bounded by `opts.budget`. Page failures
    /// are retried, then swallowed; the listing degrades to `complete:
    /// false` rather than erroring once at least one page has landed.
    pub async fn list(&self, opts: &FetchOptions) -> Result<NamespaceListing> {
        let cache_key = self.cache_key();

        if !opts.force_refresh {
            if let Some(cached) = self.cache.get(&cache_key) {
                info!("Using cached namespace list ({} groups)", cached.len());
                return Ok(NamespaceListing {
                    namespaces: cached,
                    complete: true,
                    from_cache: true,
                });
            }
        }

        let deadline = Instant::now() + opts.budget;

        // Fail fast before any paginated work if the instance is down.
        let version = self
            .client
            .check_version()
            .await
            .map_err(|e| CidashError::Unreachable(e.to_string()))?;
        info!("GitLab version: {}", version.version);

        // The first page is also clamped to the deadline; with zero pages
        // fetched there is nothing partial to return, so expiry here is a
        // plain timeout.
        let first_fetch = self.retry.run(
            || self.client.fetch_groups_page(1, PER_PAGE),
            CidashError::is_transient,
        );
        let (first_page, page_info) = match timeout_at(deadline, first_fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CidashError::Timeout(
                    "execution budget exceeded before the first page of groups".into(),
                ));
            }
        };

        let mut namespaces: Vec<Namespace> =
            first_page.into_iter().map(Namespace::from).collect();
        let mut degraded = false;

        let planned_pages = page_info.total_pages.min(MAX_PAGES);
        let capped = page_info.total_pages > MAX_PAGES;
        info!(
            "Found {} total groups across {} pages (fetching {})",
            page_info.total, page_info.total_pages, planned_pages
        );

        let remaining: Vec<u32> = (2..=planned_pages).collect();
        for batch in remaining.chunks(MAX_CONCURRENT) {
            if Instant::now() >= deadline {
                warn!(
                    "Execution budget exhausted, returning {} groups as partial results",
                    namespaces.len()
                );
                return Ok(NamespaceListing {
                    namespaces,
                    complete: false,
                    from_cache: false,
                });
            }

            let fetches = batch.iter().map(|&page| async move {
                let result = self
                    .retry
                    .run(
                        || self.client.fetch_groups_page(page, PER_PAGE),
                        CidashError::is_transient,
                    )
                    .await;
                match result {
                    Ok((groups, _)) => Some(groups),
                    Err(err) => {
                        warn!("Error fetching groups page {page}: {err}");
                        None
                    }
                }
            });

            match timeout_at(deadline, join_all(fetches)).await {
                Ok(results) => {
                    for result in results {
                        match result {
                            Some(groups) => {
                                namespaces.extend(groups.into_iter().map(Namespace::from));
                            }
                            None => degraded = true,
                        }
                    }
                }
                Err(_) => {
                    warn!(
                        "Execution budget exhausted mid-batch, returning {} groups as partial results",
                        namespaces.len()
                    );
                    return Ok(NamespaceListing {
                        namespaces,
                        complete: false,
                        from_cache: false,
                    });
                }
            }
        }

        let complete = !capped && !degraded;
        if complete {
            self.cache.insert(&cache_key, namespaces.clone());
        }

        info!(
            "Fetched {} groups total (complete: {complete})",
            namespaces.len()
        );
        Ok(NamespaceListing {
            namespaces,
            complete,
            from_cache: false,
        })
    }
}
