use indexmap::IndexMap;
use serde::Serialize;

use crate::pipelines::ProjectPipelines;
use crate::timerange::TimeRange;

/// Six fixed buckets; anything unrecognized lands in `other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: u64,
    pub failed: u64,
    pub canceled: u64,
    pub running: u64,
    pub pending: u64,
    pub other: u64,
}

impl StatusCounts {
    fn bucket(&mut self, status: &str) {
        match status {
            "success" => self.success += 1,
            "failed" => self.failed += 1,
            "canceled" => self.canceled += 1,
            "running" => self.running += 1,
            "pending" => self.pending += 1,
            _ => self.other += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.success + self.failed + self.canceled + self.running + self.pending + self.other
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBuilds {
    pub project_id: u64,
    pub project_name: String,
    pub build_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMinutes {
    pub project_id: u64,
    pub project_name: String,
    pub total_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesEntry {
    pub period: String,
    pub build_count: u64,
    pub minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CiMetrics {
    pub total_builds: u64,
    pub total_minutes: f64,
    pub builds_per_project: Vec<ProjectBuilds>,
    pub minutes_per_project: Vec<ProjectMinutes>,
    pub builds_by_status: StatusCounts,
    pub time_series_data: Vec<TimeSeriesEntry>,
}

/// Folds the fetched bundles into totals, per-project breakdowns, a status
/// histogram, and a time-bucketed series. Projects with zero pipelines
/// contribute nothing anywhere.
pub fn process_ci_metrics(bundles: &[ProjectPipelines], range: TimeRange) -> CiMetrics {
    let mut total_builds = 0u64;
    let mut total_minutes = 0f64;
    let mut builds_by_status = StatusCounts::default();
    // First-encounter project order is preserved in the output lists.
    let mut per_project: IndexMap<u64, (String, u64, f64)> = IndexMap::new();
    let mut series: Vec<TimeSeriesEntry> = Vec::new();

    for bundle in bundles {
        if bundle.pipelines.is_empty() {
            continue;
        }

        let project = per_project
            .entry(bundle.project_id)
            .or_insert_with(|| (bundle.project_name.clone(), 0, 0.0));

        for pipeline in &bundle.pipelines {
            total_builds += 1;
            project.1 += 1;

            total_minutes += pipeline.total_duration_minutes;
            project.2 += pipeline.total_duration_minutes;

            builds_by_status.bucket(&pipeline.status);

            if let Some(created_at) = pipeline.created_at {
                let date = created_at.format("%Y-%m-%d").to_string();
                match series.iter_mut().find(|entry| entry.period == date) {
                    Some(entry) => {
                        entry.build_count += 1;
                        entry.minutes += pipeline.total_duration_minutes;
                    }
                    None => series.push(TimeSeriesEntry {
                        period: date,
                        build_count: 1,
                        minutes: pipeline.total_duration_minutes,
                    }),
                }
            }
        }
    }

    // ISO dates sort chronologically as strings.
    series.sort_by(|a, b| a.period.cmp(&b.period));
    let time_series_data = group_time_series_data(series, range);

    let builds_per_project = per_project
        .iter()
        .map(|(&project_id, (name, builds, _))| ProjectBuilds {
            project_id,
            project_name: name.clone(),
            build_count: *builds,
        })
        .collect();

    let minutes_per_project = per_project
        .iter()
        .map(|(&project_id, (name, _, minutes))| ProjectMinutes {
            project_id,
            project_name: name.clone(),
            total_minutes: *minutes,
        })
        .collect();

    CiMetrics {
        total_builds,
        total_minutes,
        builds_per_project,
        minutes_per_project,
        builds_by_status,
        time_series_data,
    }
}

/// Re-buckets the daily series for the selected range. Day passes through
/// at daily granularity (not sub-bucketed by hour); week and month keep
/// the daily buckets; year merges entries into year-month buckets.
pub fn group_time_series_data(
    series: Vec<TimeSeriesEntry>,
    range: TimeRange,
) -> Vec<TimeSeriesEntry> {
    if range == TimeRange::Day {
        return series;
    }

    let mut grouped: IndexMap<String, TimeSeriesEntry> = IndexMap::new();
    for entry in series {
        let period = match range {
            TimeRange::Year => entry.period.chars().take(7).collect(),
            _ => entry.period.clone(),
        };

        match grouped.get_mut(&period) {
            Some(existing) => {
                existing.build_count += entry.build_count;
                existing.minutes += entry.minutes;
            }
            None => {
                grouped.insert(
                    period.clone(),
                    TimeSeriesEntry {
                        period,
                        build_count: entry.build_count,
                        minutes: entry.minutes,
                    },
                );
            }
        }
    }

    grouped.into_values().collect()
}
