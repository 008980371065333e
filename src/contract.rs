//! # contract: the remote repository-host boundary
//!
//! This module defines the trait ([`RepoHost`]) and supporting types through
//! which the harvesting pipeline talks to a source-control hosting API.
//! The pipeline only needs paginated retrieval of three collections scoped
//! to one repository — commits, pull requests and issues — plus the handful
//! of per-item fields the harvesters fold over. Everything wire-level
//! (URLs, auth headers, JSON shapes) lives in the concrete implementation.
//!
//! ## Mocking & Testing
//! The trait is annotated for `mockall` so the integration tests can drive
//! the whole pipeline against scripted pages without a network.
//!
//! ## Error classification
//! [`FetchError`] is the single error currency at this boundary. Each
//! variant classifies as either retryable-with-backoff or fatal via
//! [`FetchError::class`]; the pagination client acts on that classification
//! so harvesters never see a retryable failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// A repository slug in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId(String);

impl RepoId {
    /// Parses an `owner/name` slug. Rejects anything without exactly one
    /// `/` separating two non-empty segments.
    pub fn parse(slug: &str) -> Result<Self, FetchError> {
        let mut parts = slug.splitn(2, '/');
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(RepoId(slug.to_string()))
            }
            _ => Err(FetchError::NotFound {
                resource: format!("invalid repository slug '{slug}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One commit as retrieved from the host, reduced to the fields the
/// commit harvester folds over.
#[derive(Debug, Clone)]
pub struct RemoteCommit {
    /// Commit author name from the git metadata. May be empty; empty-author
    /// commits are consumed but contribute no record.
    pub author: String,
    /// Lines added + lines removed.
    pub churn: u64,
    /// Author timestamp.
    pub date: DateTime<Utc>,
}

/// One pull request, any state.
#[derive(Debug, Clone)]
pub struct RemotePullRequest {
    /// Opening user's login. May be empty (deleted account).
    pub author: String,
    pub additions: u64,
    pub deletions: u64,
    pub merged: bool,
    pub created_at: DateTime<Utc>,
    /// Present only when `merged` is true.
    pub merged_at: Option<DateTime<Utc>>,
}

/// One issue, any state.
#[derive(Debug, Clone)]
pub struct RemoteIssue {
    /// Assignee login, if the issue has one.
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Present only for closed issues.
    pub closed_at: Option<DateTime<Utc>>,
}

/// Errors surfaced by a [`RepoHost`] when fetching a page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The host's rate limit was exhausted.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Connection-level failure (DNS, refused, reset, ...).
    #[error("connection failure: {0}")]
    Connection(String),

    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The host rejected our credentials.
    #[error("bad credentials")]
    BadCredentials,

    /// The repository or collection does not exist (or is not visible).
    #[error("unknown resource: {resource}")]
    NotFound { resource: String },

    /// Any other API-level failure.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// How the pagination client must react to a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Sleep for the given backoff, then re-fetch. Unbounded retries;
    /// total work is bounded by the caller's item ceiling instead.
    Retryable(Duration),
    /// Terminate the stream and fail the current stage.
    Fatal,
}

/// Backoff before re-fetching after a rate-limit signal.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(300);
/// Backoff before re-fetching after a connection failure or timeout.
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(10);

impl FetchError {
    /// Classifies this error for the retry loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::RateLimited => ErrorClass::Retryable(RATE_LIMIT_BACKOFF),
            FetchError::Connection(_) | FetchError::Timeout(_) => {
                ErrorClass::Retryable(TRANSIENT_BACKOFF)
            }
            FetchError::BadCredentials | FetchError::NotFound { .. } | FetchError::Api { .. } => {
                ErrorClass::Fatal
            }
        }
    }
}

/// Paginated retrieval of the three activity collections for one repository.
///
/// Pages are 1-based. An empty page means the collection is exhausted;
/// implementations must not signal exhaustion through an error.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Fetch one page of commits, newest first.
    async fn commits_page(&self, repo: &RepoId, page: u32)
        -> Result<Vec<RemoteCommit>, FetchError>;

    /// Fetch one page of pull requests, all states.
    async fn pull_requests_page(
        &self,
        repo: &RepoId,
        page: u32,
    ) -> Result<Vec<RemotePullRequest>, FetchError>;

    /// Fetch one page of issues, all states.
    async fn issues_page(&self, repo: &RepoId, page: u32)
        -> Result<Vec<RemoteIssue>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_accepts_owner_slash_name() {
        let id = RepoId::parse("scikit-learn/scikit-learn").unwrap();
        assert_eq!(id.as_str(), "scikit-learn/scikit-learn");
    }

    #[test]
    fn repo_id_rejects_malformed_slugs() {
        assert!(RepoId::parse("no-slash").is_err());
        assert!(RepoId::parse("/name").is_err());
        assert!(RepoId::parse("owner/").is_err());
        assert!(RepoId::parse("a/b/c").is_err());
    }

    #[test]
    fn rate_limit_classifies_with_long_backoff() {
        assert_eq!(
            FetchError::RateLimited.class(),
            ErrorClass::Retryable(RATE_LIMIT_BACKOFF)
        );
    }

    #[test]
    fn transient_errors_classify_with_short_backoff() {
        let conn = FetchError::Connection("reset".into());
        let timeout = FetchError::Timeout("deadline".into());
        assert_eq!(conn.class(), ErrorClass::Retryable(TRANSIENT_BACKOFF));
        assert_eq!(timeout.class(), ErrorClass::Retryable(TRANSIENT_BACKOFF));
    }

    #[test]
    fn api_failures_classify_fatal() {
        assert_eq!(FetchError::BadCredentials.class(), ErrorClass::Fatal);
        assert_eq!(
            FetchError::NotFound {
                resource: "x".into()
            }
            .class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            FetchError::Api {
                status: 500,
                message: "boom".into()
            }
            .class(),
            ErrorClass::Fatal
        );
    }
}
