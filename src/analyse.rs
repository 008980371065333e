//! High-level pipeline: orchestrates the four stages of a harvesting run.
//!
//! Stages run strictly sequentially — commits, then pull requests, then
//! issues, then the final aggregation — each stage getting a fresh item
//! budget and writing its table as soon as it completes. A fatal stage
//! error stops the run there; tables already written stay on disk.
//! There is no parallelism: the remote API is rate limited and the
//! pipeline has nothing useful to do while it waits.
//!
//! # Major Types
//! - [`AnalyseConfig`]: repository, per-stage item ceiling, output directory
//! - [`AnalyseReport`]: per-stage row counts and retry telemetry
//!
//! # Callable From
//! - The CLI (`run` in lib.rs) and the integration tests, which drive this
//!   with a mocked [`RepoHost`].

use std::path::PathBuf;

use tracing::info;

use crate::aggregate::{developer_performance, fold_commits};
use crate::contract::{RepoHost, RepoId};
use crate::harvest::{
    harvest_commits, harvest_issues, harvest_pull_requests, issue_rows, HarvestError,
};
use crate::sink::{CsvSink, SinkError};

/// Configuration for one harvesting run.
#[derive(Debug, Clone)]
pub struct AnalyseConfig {
    pub repo: RepoId,
    /// Per-stage item ceiling. Each stage consumes at most this many items;
    /// `u64::MAX` is effectively unbounded.
    pub limit: u64,
    /// Directory the four CSV tables are written into.
    pub output_dir: PathBuf,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct AnalyseReport {
    pub repo: String,
    /// Rows in the commits table.
    pub commit_rows: usize,
    /// Rows in the PR table (one per author).
    pub pr_rows: usize,
    /// Rows in the issue table (one per assignee per closure date).
    pub issue_rows: usize,
    /// Rows in the developer-performance table.
    pub developer_rows: usize,
    /// Items consumed across all three harvest stages.
    pub items_seen: u64,
    /// Retryable fetch failures absorbed across all three stages.
    pub retries: u64,
}

/// A harvesting run failed before the final table was written.
#[derive(Debug, thiserror::Error)]
pub enum AnalyseError {
    #[error(transparent)]
    Stage(#[from] HarvestError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

fn float_cell(v: f64) -> String {
    format!("{v}")
}

/// Runs the full pipeline for one repository, writing `commits.csv`,
/// `pr_data.csv`, `issue_data.csv` and `developer_performance.csv` into
/// the sink as each stage completes.
pub async fn analyse<H: RepoHost>(
    config: &AnalyseConfig,
    host: &H,
    sink: &CsvSink,
) -> Result<AnalyseReport, AnalyseError> {
    info!(repo = %config.repo, limit = config.limit, "starting harvesting run");

    // --- Stage 1: commits ---
    let (commit_records, commit_stats) =
        harvest_commits(host, &config.repo, config.limit).await?;
    sink.write_table(
        "commits",
        &["Author", "Commits", "CodeChurn", "Date"],
        commit_records.iter().map(|r| {
            vec![
                r.author.clone(),
                "1".to_string(),
                r.churn.to_string(),
                r.date.to_string(),
            ]
        }),
    )?;

    // --- Stage 2: pull requests ---
    let (pr_stats_by_author, pr_stats) =
        harvest_pull_requests(host, &config.repo, config.limit).await?;
    sink.write_table(
        "pr_data",
        &["Author", "PRs", "MergedPRs", "TotalPRSize", "TotalReviewTimeHours"],
        pr_stats_by_author.iter().map(|(author, s)| {
            vec![
                author.clone(),
                s.opened.to_string(),
                s.merged.to_string(),
                s.total_size.to_string(),
                float_cell(s.total_review_hours),
            ]
        }),
    )?;

    // --- Stage 3: issues ---
    let (issue_stats_by_assignee, issue_stats) =
        harvest_issues(host, &config.repo, config.limit).await?;
    let exploded = issue_rows(&issue_stats_by_assignee);
    sink.write_table(
        "issue_data",
        &[
            "Assignee",
            "ResolvedIssues",
            "TotalResolutionTimeHours",
            "AvgIssueResolutionTimeHours",
            "Date",
        ],
        exploded.iter().map(|r| {
            vec![
                r.assignee.clone(),
                r.resolved.to_string(),
                float_cell(r.total_resolution_hours),
                float_cell(r.avg_resolution_hours),
                r.date.to_string(),
            ]
        }),
    )?;

    // --- Stage 4: aggregation ---
    let commit_totals = fold_commits(&commit_records);
    let rows = developer_performance(&commit_totals, &pr_stats_by_author, &issue_stats_by_assignee);
    sink.write_table(
        "developer_performance",
        &[
            "Developer",
            "Commits",
            "CodeChurnLines",
            "PRsOpened",
            "PRsMerged",
            "AvgPRSize",
            "AvgPRReviewTimeDays",
            "IssuesResolved",
            "AvgIssueResolutionTimeHours",
        ],
        rows.iter().map(|r| {
            vec![
                r.developer.clone(),
                r.commits.to_string(),
                r.code_churn.to_string(),
                r.prs_opened.to_string(),
                r.prs_merged.to_string(),
                float_cell(r.avg_pr_size),
                float_cell(r.avg_pr_review_days),
                r.issues_resolved.to_string(),
                float_cell(r.avg_issue_resolution_hours),
            ]
        }),
    )?;

    let report = AnalyseReport {
        repo: config.repo.to_string(),
        commit_rows: commit_records.len(),
        pr_rows: pr_stats_by_author.len(),
        issue_rows: exploded.len(),
        developer_rows: rows.len(),
        items_seen: commit_stats.items_seen + pr_stats.items_seen + issue_stats.items_seen,
        retries: commit_stats.retries + pr_stats.retries + issue_stats.retries,
    };
    info!(
        repo = %config.repo,
        developers = report.developer_rows,
        items = report.items_seen,
        retries = report.retries,
        "harvesting run complete"
    );
    Ok(report)
}
