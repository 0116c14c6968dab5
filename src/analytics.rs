//! Read-only analytics over the stored events.
//!
//! Every query only looks at events created inside an [`AnalyticsWindow`]. An empty result is a
//! valid outcome and never an error.
use chrono::{DateTime, Duration, Utc};

use crate::database::{BranchCommitCount, ContributorCommitCount, DbClient, MergeTimeAggregate};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Time range covered by an analytics query: events created at `since` or later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsWindow {
    since: DateTime<Utc>,
}

impl AnalyticsWindow {
    /// Covers the `days` days preceding `now`.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        let since = Duration::try_days(i64::from(days))
            .and_then(|duration| now.checked_sub_signed(duration))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { since }
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeTimeSummary {
    /// No pull request was merged inside the window.
    NoData,
    Average {
        /// Average time from opening to merge, rounded to two decimals.
        hours: f64,
        merged_count: i64,
    },
}

impl MergeTimeSummary {
    /// The average in hours with exactly two decimals, e.g. `2.00`.
    pub fn formatted_hours(&self) -> Option<String> {
        match self {
            MergeTimeSummary::NoData => None,
            MergeTimeSummary::Average { hours, .. } => Some(format!("{hours:.2}")),
        }
    }
}

/// Results of all analytics queries over the same window.
#[derive(Debug)]
pub struct AnalyticsSummary {
    pub commits_per_branch: Vec<BranchCommitCount>,
    pub most_active_contributor: Option<ContributorCommitCount>,
    pub merge_time: MergeTimeSummary,
}

pub async fn commits_per_branch(
    db: &DbClient,
    window: AnalyticsWindow,
) -> anyhow::Result<Vec<BranchCommitCount>> {
    db.commits_per_branch(window.since()).await
}

pub async fn most_active_contributor(
    db: &DbClient,
    window: AnalyticsWindow,
) -> anyhow::Result<Option<ContributorCommitCount>> {
    db.most_active_contributor(window.since()).await
}

pub async fn average_merge_time(
    db: &DbClient,
    window: AnalyticsWindow,
) -> anyhow::Result<MergeTimeSummary> {
    let aggregate = db.average_merge_time_ms(window.since()).await?;
    Ok(summarize_merge_time(aggregate))
}

/// Runs all analytics queries concurrently.
pub async fn summarize(db: &DbClient, window: AnalyticsWindow) -> anyhow::Result<AnalyticsSummary> {
    let (commits_per_branch, most_active_contributor, merge_time) = tokio::try_join!(
        commits_per_branch(db, window),
        most_active_contributor(db, window),
        average_merge_time(db, window)
    )?;
    Ok(AnalyticsSummary {
        commits_per_branch,
        most_active_contributor,
        merge_time,
    })
}

fn summarize_merge_time(aggregate: MergeTimeAggregate) -> MergeTimeSummary {
    match aggregate.average_ms {
        Some(average_ms) if aggregate.merged_count > 0 && average_ms.is_finite() => {
            MergeTimeSummary::Average {
                hours: round_to_hundredths(average_ms / MILLIS_PER_HOUR),
                merged_count: aggregate.merged_count,
            }
        }
        _ => MergeTimeSummary::NoData,
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
