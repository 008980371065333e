//! The three harvesting stages: commits, pull requests, issues.
//!
//! Each harvester consumes a [`Paginator`] over its collection under an
//! explicit item budget passed in by the orchestrator (no shared mutable
//! counter; see `analyse`). Every consumed item counts against the budget,
//! whether or not it contributes a record. A budget of zero consumes
//! nothing and never touches the network.
//!
//! A fatal fetch failure aborts the stage with [`HarvestError`]; the
//! dataset the stage would have produced is discarded, while tables
//! already flushed by earlier stages stay on disk.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::client::{Paginator, Step};
use crate::contract::{FetchError, RepoHost, RepoId};

/// One kept commit, in API order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub author: String,
    /// Lines added + removed.
    pub churn: u64,
    /// Commit timestamp truncated to calendar-date granularity.
    pub date: NaiveDate,
}

/// Running pull-request totals for one author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorPrStats {
    pub opened: u64,
    pub merged: u64,
    /// additions + deletions summed over every opened PR.
    pub total_size: u64,
    /// Sum of (merged_at − created_at) in hours, merged PRs only.
    pub total_review_hours: f64,
}

/// Running resolved-issue totals for one assignee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssigneeIssueStats {
    pub resolved: u64,
    /// Sum of (closed_at − created_at) in hours.
    pub total_resolution_hours: f64,
    /// Closure date of each resolved issue, in consumption order.
    pub closure_dates: Vec<NaiveDate>,
}

/// Telemetry for one completed stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageStats {
    /// Items consumed from the stream (kept or skipped).
    pub items_seen: u64,
    /// Retryable fetch failures absorbed by the pagination client.
    pub retries: u64,
}

/// A harvesting stage hit a fatal fetch failure.
#[derive(Debug, thiserror::Error)]
#[error("{stage} harvest aborted: {source}")]
pub struct HarvestError {
    pub stage: &'static str,
    #[source]
    pub source: FetchError,
}

fn hours_between(start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

/// Harvests up to `budget` commits into per-commit records.
///
/// Commits without an author name are consumed but dropped.
pub async fn harvest_commits<H: RepoHost>(
    host: &H,
    repo: &RepoId,
    budget: u64,
) -> Result<(Vec<CommitRecord>, StageStats), HarvestError> {
    let mut stream = Paginator::new(move |page| host.commits_page(repo, page));
    let mut records = Vec::new();
    let mut items_seen = 0u64;

    while items_seen < budget {
        match stream.next().await {
            Step::Item(commit) => {
                items_seen += 1;
                if !commit.author.is_empty() {
                    records.push(CommitRecord {
                        author: commit.author,
                        churn: commit.churn,
                        date: commit.date.date_naive(),
                    });
                }
            }
            Step::Done => break,
            Step::Fatal(e) => {
                error!(stage = "commits", error = %e, "fatal fetch failure, aborting stage");
                return Err(HarvestError {
                    stage: "commits",
                    source: e,
                });
            }
        }
    }

    let stats = StageStats {
        items_seen,
        retries: stream.retries(),
    };
    info!(
        items = stats.items_seen,
        kept = records.len(),
        retries = stats.retries,
        "commit harvest complete"
    );
    Ok((records, stats))
}

/// Harvests up to `budget` pull requests into per-author running totals.
///
/// PRs without an author login are consumed but contribute nothing. Size
/// counts for every opened PR; review time only for merged ones.
pub async fn harvest_pull_requests<H: RepoHost>(
    host: &H,
    repo: &RepoId,
    budget: u64,
) -> Result<(BTreeMap<String, AuthorPrStats>, StageStats), HarvestError> {
    let mut stream = Paginator::new(move |page| host.pull_requests_page(repo, page));
    let mut stats_by_author: BTreeMap<String, AuthorPrStats> = BTreeMap::new();
    let mut items_seen = 0u64;

    while items_seen < budget {
        match stream.next().await {
            Step::Item(pr) => {
                items_seen += 1;
                if pr.author.is_empty() {
                    continue;
                }
                let entry = stats_by_author.entry(pr.author.clone()).or_default();
                entry.opened += 1;
                entry.total_size += pr.additions + pr.deletions;
                if pr.merged {
                    entry.merged += 1;
                    if let Some(merged_at) = pr.merged_at {
                        entry.total_review_hours += hours_between(pr.created_at, merged_at);
                    }
                }
            }
            Step::Done => break,
            Step::Fatal(e) => {
                error!(stage = "pull_requests", error = %e, "fatal fetch failure, aborting stage");
                return Err(HarvestError {
                    stage: "pull_requests",
                    source: e,
                });
            }
        }
    }

    let stats = StageStats {
        items_seen,
        retries: stream.retries(),
    };
    info!(
        items = stats.items_seen,
        authors = stats_by_author.len(),
        retries = stats.retries,
        "pull request harvest complete"
    );
    Ok((stats_by_author, stats))
}

/// Harvests up to `budget` issues into per-assignee running totals.
///
/// Only issues that are both closed and assigned contribute.
pub async fn harvest_issues<H: RepoHost>(
    host: &H,
    repo: &RepoId,
    budget: u64,
) -> Result<(BTreeMap<String, AssigneeIssueStats>, StageStats), HarvestError> {
    let mut stream = Paginator::new(move |page| host.issues_page(repo, page));
    let mut stats_by_assignee: BTreeMap<String, AssigneeIssueStats> = BTreeMap::new();
    let mut items_seen = 0u64;

    while items_seen < budget {
        match stream.next().await {
            Step::Item(issue) => {
                items_seen += 1;
                let (Some(assignee), Some(closed_at)) = (issue.assignee, issue.closed_at) else {
                    continue;
                };
                let entry = stats_by_assignee.entry(assignee).or_default();
                entry.resolved += 1;
                entry.total_resolution_hours += hours_between(issue.created_at, closed_at);
                entry.closure_dates.push(closed_at.date_naive());
            }
            Step::Done => break,
            Step::Fatal(e) => {
                error!(stage = "issues", error = %e, "fatal fetch failure, aborting stage");
                return Err(HarvestError {
                    stage: "issues",
                    source: e,
                });
            }
        }
    }

    let stats = StageStats {
        items_seen,
        retries: stream.retries(),
    };
    info!(
        items = stats.items_seen,
        assignees = stats_by_assignee.len(),
        retries = stats.retries,
        "issue harvest complete"
    );
    Ok((stats_by_assignee, stats))
}

/// One row of the issue table: an assignee's aggregate columns repeated
/// once per closure date, so a day-by-day chart needs no further join.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRow {
    pub assignee: String,
    pub resolved: u64,
    pub total_resolution_hours: f64,
    pub avg_resolution_hours: f64,
    pub date: NaiveDate,
}

/// Explodes per-assignee issue stats into one row per closure date.
pub fn issue_rows(stats: &BTreeMap<String, AssigneeIssueStats>) -> Vec<IssueRow> {
    let mut rows = Vec::new();
    for (assignee, s) in stats {
        let avg = s.total_resolution_hours / s.resolved.max(1) as f64;
        for date in &s.closure_dates {
            rows.push(IssueRow {
                assignee: assignee.clone(),
                resolved: s.resolved,
                total_resolution_hours: s.total_resolution_hours,
                avg_resolution_hours: avg,
                date: *date,
            });
        }
    }
    rows
}
