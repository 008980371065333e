//! Full-pipeline tests: a mocked repository host drives `analyse` end to
//! end and the emitted CSV tables are checked against the expected rows.

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use repo_metrics::analyse::{analyse, AnalyseConfig, AnalyseError};
use repo_metrics::contract::{
    FetchError, MockRepoHost, RemoteCommit, RemoteIssue, RemotePullRequest, RepoId,
};
use repo_metrics::sink::CsvSink;

fn utc(y: i32, m: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn config(dir: &std::path::Path, limit: u64) -> AnalyseConfig {
    AnalyseConfig {
        repo: RepoId::parse("acme/widgets").unwrap(),
        limit,
        output_dir: dir.to_path_buf(),
    }
}

/// A host with one page of each collection: two alice commits plus one
/// authorless commit, one merged PR by bob, two resolved issues (and one
/// open) assigned to dana.
fn scripted_host() -> MockRepoHost {
    let mut host = MockRepoHost::new();
    host.expect_commits_page().returning(|_, page| {
        if page == 1 {
            Ok(vec![
                RemoteCommit {
                    author: "alice".into(),
                    churn: 10,
                    date: utc(2024, 1, 1, 12),
                },
                RemoteCommit {
                    author: "alice".into(),
                    churn: 5,
                    date: utc(2024, 1, 2, 12),
                },
                RemoteCommit {
                    author: "".into(),
                    churn: 3,
                    date: utc(2024, 1, 3, 12),
                },
            ])
        } else {
            Ok(vec![])
        }
    });
    host.expect_pull_requests_page().returning(|_, page| {
        if page == 1 {
            Ok(vec![RemotePullRequest {
                author: "bob".into(),
                additions: 20,
                deletions: 5,
                merged: true,
                created_at: utc(2024, 3, 1, 9),
                merged_at: Some(utc(2024, 3, 1, 10)),
            }])
        } else {
            Ok(vec![])
        }
    });
    host.expect_issues_page().returning(|_, page| {
        if page == 1 {
            Ok(vec![
                RemoteIssue {
                    assignee: Some("dana".into()),
                    created_at: utc(2024, 5, 1, 0),
                    closed_at: Some(utc(2024, 5, 1, 6)),
                },
                RemoteIssue {
                    assignee: Some("dana".into()),
                    created_at: utc(2024, 5, 2, 0),
                    closed_at: Some(utc(2024, 5, 2, 12)),
                },
                RemoteIssue {
                    assignee: Some("dana".into()),
                    created_at: utc(2024, 5, 3, 0),
                    closed_at: None,
                },
            ])
        } else {
            Ok(vec![])
        }
    });
    host
}

#[tokio::test]
async fn writes_all_four_tables_with_expected_rows() {
    let dir = tempdir().unwrap();
    let sink = CsvSink::new(dir.path());
    let host = scripted_host();

    let report = analyse(&config(dir.path(), u64::MAX), &host, &sink)
        .await
        .unwrap();

    assert_eq!(report.commit_rows, 2);
    assert_eq!(report.pr_rows, 1);
    assert_eq!(report.issue_rows, 2);
    assert_eq!(report.developer_rows, 3);
    assert_eq!(report.items_seen, 3 + 1 + 3);
    assert_eq!(report.retries, 0);

    let commits = fs::read_to_string(sink.table_path("commits")).unwrap();
    assert_eq!(
        commits,
        "Author,Commits,CodeChurn,Date\n\
         alice,1,10,2024-01-01\n\
         alice,1,5,2024-01-02\n"
    );

    let prs = fs::read_to_string(sink.table_path("pr_data")).unwrap();
    assert_eq!(
        prs,
        "Author,PRs,MergedPRs,TotalPRSize,TotalReviewTimeHours\n\
         bob,1,1,25,1\n"
    );

    // One row per closure date, aggregate columns repeated.
    let issues = fs::read_to_string(sink.table_path("issue_data")).unwrap();
    assert_eq!(
        issues,
        "Assignee,ResolvedIssues,TotalResolutionTimeHours,AvgIssueResolutionTimeHours,Date\n\
         dana,2,18,9,2024-05-01\n\
         dana,2,18,9,2024-05-02\n"
    );

    // Union of the three key sets, absent metrics defaulting to zero.
    let perf = fs::read_to_string(sink.table_path("developer_performance")).unwrap();
    assert_eq!(
        perf,
        "Developer,Commits,CodeChurnLines,PRsOpened,PRsMerged,AvgPRSize,AvgPRReviewTimeDays,IssuesResolved,AvgIssueResolutionTimeHours\n\
         alice,2,15,0,0,0,0,0,0\n\
         bob,0,0,1,1,25,1,0,0\n\
         dana,0,0,0,0,0,0,2,9\n"
    );
}

#[tokio::test]
async fn rerun_produces_identical_tables() {
    let dir = tempdir().unwrap();
    let sink = CsvSink::new(dir.path());
    let host = scripted_host();
    let cfg = config(dir.path(), u64::MAX);

    analyse(&cfg, &host, &sink).await.unwrap();
    let first: Vec<String> = ["commits", "pr_data", "issue_data", "developer_performance"]
        .iter()
        .map(|t| fs::read_to_string(sink.table_path(t)).unwrap())
        .collect();

    analyse(&cfg, &host, &sink).await.unwrap();
    let second: Vec<String> = ["commits", "pr_data", "issue_data", "developer_performance"]
        .iter()
        .map(|t| fs::read_to_string(sink.table_path(t)).unwrap())
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn ceiling_bounds_each_stage_independently() {
    let dir = tempdir().unwrap();
    let sink = CsvSink::new(dir.path());
    let host = scripted_host();

    let report = analyse(&config(dir.path(), 2), &host, &sink).await.unwrap();

    // Two items per stage: both alice commits, the single PR, the first
    // two issues (both dana's resolved ones).
    assert_eq!(report.commit_rows, 2);
    assert_eq!(report.items_seen, 2 + 1 + 2);
    assert_eq!(report.issue_rows, 2);
}

#[tokio::test]
async fn zero_ceiling_writes_empty_tables_without_fetching() {
    let dir = tempdir().unwrap();
    let sink = CsvSink::new(dir.path());
    // No expectations: any fetch would panic the mock.
    let host = MockRepoHost::new();

    let report = analyse(&config(dir.path(), 0), &host, &sink).await.unwrap();

    assert_eq!(report.items_seen, 0);
    assert_eq!(report.developer_rows, 0);
    for table in ["commits", "pr_data", "issue_data", "developer_performance"] {
        let content = fs::read_to_string(sink.table_path(table)).unwrap();
        assert_eq!(content.lines().count(), 1, "{table} should be header-only");
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_mid_stream_resumes_and_respects_ceiling() {
    let dir = tempdir().unwrap();
    let sink = CsvSink::new(dir.path());

    let mut host = MockRepoHost::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in_mock = calls.clone();
    host.expect_commits_page().returning(move |_, page| {
        if page == 1 {
            // First attempt hits the rate limit; the re-fetch succeeds.
            if calls_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FetchError::RateLimited)
            } else {
                Ok((0..10)
                    .map(|i| RemoteCommit {
                        author: format!("dev{i}"),
                        churn: 1,
                        date: utc(2024, 1, 1, 0),
                    })
                    .collect())
            }
        } else {
            Ok(vec![])
        }
    });
    host.expect_pull_requests_page().returning(|_, _| Ok(vec![]));
    host.expect_issues_page().returning(|_, _| Ok(vec![]));

    let report = analyse(&config(dir.path(), 3), &host, &sink).await.unwrap();

    assert_eq!(report.retries, 1);
    assert_eq!(report.commit_rows, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fatal_stage_error_keeps_earlier_tables() {
    let dir = tempdir().unwrap();
    let sink = CsvSink::new(dir.path());

    let mut host = MockRepoHost::new();
    host.expect_commits_page().returning(|_, page| {
        if page == 1 {
            Ok(vec![RemoteCommit {
                author: "alice".into(),
                churn: 1,
                date: utc(2024, 1, 1, 0),
            }])
        } else {
            Ok(vec![])
        }
    });
    host.expect_pull_requests_page()
        .returning(|_, _| Err(FetchError::BadCredentials));

    let err = analyse(&config(dir.path(), u64::MAX), &host, &sink)
        .await
        .unwrap_err();

    match err {
        AnalyseError::Stage(e) => assert_eq!(e.stage, "pull_requests"),
        other => panic!("unexpected error: {other}"),
    }
    // The commit stage already flushed its table; later tables were never
    // attempted.
    assert!(sink.table_path("commits").exists());
    assert!(!sink.table_path("pr_data").exists());
    assert!(!sink.table_path("issue_data").exists());
    assert!(!sink.table_path("developer_performance").exists());
}
