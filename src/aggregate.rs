//! Final aggregation: fold commit records by author and join the three
//! keyed datasets into one row per developer.
//!
//! The commit harvester emits one record per commit, so the join is
//! preceded by [`fold_commits`], which groups records into per-author
//! frequency + churn totals. The key set of the output is the union of
//! the three datasets' keys; a developer absent from a dataset simply
//! contributes zero for its columns. Averages divide by `max(n, 1)` so a
//! zero-count developer gets a zero average instead of a division fault.

use std::collections::{BTreeMap, BTreeSet};

use crate::harvest::{AssigneeIssueStats, AuthorPrStats, CommitRecord};

/// Per-author commit totals (the pre-fold of [`CommitRecord`]s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitTotals {
    pub commits: u64,
    pub churn: u64,
}

/// One row of the unified developer-performance table.
#[derive(Debug, Clone, PartialEq)]
pub struct DeveloperPerformance {
    pub developer: String,
    pub commits: u64,
    pub code_churn: u64,
    pub prs_opened: u64,
    pub prs_merged: u64,
    pub avg_pr_size: f64,
    pub avg_pr_review_days: f64,
    pub issues_resolved: u64,
    pub avg_issue_resolution_hours: f64,
}

/// Groups per-commit records by author, counting commits and summing churn.
pub fn fold_commits(records: &[CommitRecord]) -> BTreeMap<String, CommitTotals> {
    let mut totals: BTreeMap<String, CommitTotals> = BTreeMap::new();
    for record in records {
        let entry = totals.entry(record.author.clone()).or_default();
        entry.commits += 1;
        entry.churn += record.churn;
    }
    totals
}

/// Joins the three keyed datasets over the union of their key sets.
pub fn developer_performance(
    commits: &BTreeMap<String, CommitTotals>,
    prs: &BTreeMap<String, AuthorPrStats>,
    issues: &BTreeMap<String, AssigneeIssueStats>,
) -> Vec<DeveloperPerformance> {
    let developers: BTreeSet<&String> = commits
        .keys()
        .chain(prs.keys())
        .chain(issues.keys())
        .collect();

    developers
        .into_iter()
        .map(|developer| {
            let commit = commits.get(developer).copied().unwrap_or_default();
            let pr = prs.get(developer).cloned().unwrap_or_default();
            let issue = issues.get(developer).cloned().unwrap_or_default();
            DeveloperPerformance {
                developer: developer.clone(),
                commits: commit.commits,
                code_churn: commit.churn,
                prs_opened: pr.opened,
                prs_merged: pr.merged,
                avg_pr_size: pr.total_size as f64 / pr.opened.max(1) as f64,
                avg_pr_review_days: pr.total_review_hours / pr.merged.max(1) as f64,
                issues_resolved: issue.resolved,
                avg_issue_resolution_hours: issue.total_resolution_hours
                    / issue.resolved.max(1) as f64,
            }
        })
        .collect()
}
