//! Aggregates GitLab CI pipeline history into build-count and duration
//! metrics. The HTTP layer serving the dashboard consumes this crate; the
//! bundled CLI exercises the same entry points.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod client;
pub mod error;
pub mod metrics;
pub mod namespaces;
pub mod pipelines;
pub mod retry;
pub mod timerange;

pub use error::{CidashError, Result};
pub use metrics::{process_ci_metrics, CiMetrics};
pub use namespaces::{FetchOptions, NamespaceEnumerator, NamespaceListing};
pub use pipelines::{fetch_pipelines_for_projects, fetch_projects};
pub use timerange::{DateRange, TimeRange};
