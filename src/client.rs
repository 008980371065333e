//! Pagination client and the GitHub implementation of [`RepoHost`].
//!
//! [`Paginator`] turns a page-oriented fetch function into a lazy item
//! stream. Retryable failures (rate limit, connection, timeout) are
//! absorbed here: the paginator sleeps the classified backoff and
//! re-fetches the same page, without bound, reporting the retry count as
//! telemetry only. Fatal failures end the stream with [`Step::Fatal`] so
//! the consuming harvester can abort its stage.
//!
//! [`GithubHost`] is the production host: GitHub REST v3 over `reqwest`
//! with bearer-token auth. Commit churn and pull-request size/merge state
//! only appear on the per-item detail endpoints, so those are fetched item
//! by item after each listing page.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::contract::{
    ErrorClass, FetchError, RemoteCommit, RemoteIssue, RemotePullRequest, RepoHost, RepoId,
};

/// Future returned by a page-fetch function. Pages are 1-based.
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Vec<T>, FetchError>>;

/// One step of a paginated item stream.
#[derive(Debug)]
pub enum Step<T> {
    /// The next item.
    Item(T),
    /// The collection is exhausted.
    Done,
    /// A fatal fetch failure; the stream yields nothing further.
    Fatal(FetchError),
}

/// Lazy, sequential item stream over a paginated collection.
///
/// Consumption is strictly sequential; the paginator buffers one page at a
/// time and re-fetches the current page after a retryable failure.
pub struct Paginator<'a, T> {
    fetch: Box<dyn FnMut(u32) -> PageFuture<'a, T> + Send + 'a>,
    /// Last page successfully buffered; the next fetch asks for `page + 1`.
    page: u32,
    buffer: VecDeque<T>,
    exhausted: bool,
    retries: u64,
}

impl<'a, T> Paginator<'a, T> {
    pub fn new<F>(fetch: F) -> Self
    where
        F: FnMut(u32) -> PageFuture<'a, T> + Send + 'a,
    {
        Paginator {
            fetch: Box::new(fetch),
            page: 0,
            buffer: VecDeque::new(),
            exhausted: false,
            retries: 0,
        }
    }

    /// Total retryable failures absorbed so far.
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Yields the next item, fetching (and retrying) pages as needed.
    pub async fn next(&mut self) -> Step<T> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Step::Item(item);
            }
            if self.exhausted {
                return Step::Done;
            }
            match (self.fetch)(self.page + 1).await {
                Ok(items) if items.is_empty() => {
                    self.exhausted = true;
                    return Step::Done;
                }
                Ok(items) => {
                    self.page += 1;
                    debug!(page = self.page, items = items.len(), "buffered page");
                    self.buffer.extend(items);
                }
                Err(e) => match e.class() {
                    ErrorClass::Retryable(backoff) => {
                        self.retries += 1;
                        warn!(
                            error = %e,
                            retries = self.retries,
                            backoff_secs = backoff.as_secs(),
                            page = self.page + 1,
                            "retryable fetch failure, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    ErrorClass::Fatal => return Step::Fatal(e),
                },
            }
        }
    }
}

// ============================================================================
// GitHub host
// ============================================================================

const PER_PAGE: u32 = 100;
const USER_AGENT: &str = concat!("repo-metrics/", env!("CARGO_PKG_VERSION"));

/// GitHub REST v3 implementation of [`RepoHost`].
pub struct GithubHost {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GithubHost {
    /// Builds a host client for api.github.com with the given token.
    pub fn new(token: String) -> Result<Self, FetchError> {
        Self::with_base_url(token, "https://api.github.com".to_string())
    }

    /// Builds a host client against an alternate base URL (GitHub
    /// Enterprise, or a stub server in tests).
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;
        Ok(GithubHost {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status.as_u16(),
                remaining.as_deref(),
                url,
                &body,
            ));
        }

        response.json::<T>().await.map_err(|e| FetchError::Api {
            status: status.as_u16(),
            message: format!("failed to decode response from {url}: {e}"),
        })
    }
}

/// Maps a transport-level reqwest error to the fetch taxonomy.
fn classify_transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(e.to_string())
    } else {
        FetchError::Connection(e.to_string())
    }
}

/// Maps a non-success HTTP status to the fetch taxonomy. A 403 only counts
/// as rate limiting when the rate-limit budget is actually exhausted.
fn classify_status(status: u16, ratelimit_remaining: Option<&str>, url: &str, body: &str) -> FetchError {
    match status {
        401 => FetchError::BadCredentials,
        404 => FetchError::NotFound {
            resource: url.to_string(),
        },
        429 => FetchError::RateLimited,
        403 if ratelimit_remaining == Some("0") => FetchError::RateLimited,
        _ => FetchError::Api {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

// Wire shapes: only the fields the harvesters read.

#[derive(Deserialize)]
struct CommitListItem {
    sha: String,
    commit: CommitMeta,
}

#[derive(Deserialize)]
struct CommitMeta {
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CommitDetail {
    stats: Option<CommitStats>,
}

#[derive(Deserialize)]
struct CommitStats {
    total: u64,
}

#[derive(Deserialize)]
struct PullListItem {
    number: u64,
}

#[derive(Deserialize)]
struct PullDetail {
    user: Option<UserRef>,
    additions: u64,
    deletions: u64,
    merged: bool,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct UserRef {
    login: String,
}

#[derive(Deserialize)]
struct IssueListItem {
    assignee: Option<UserRef>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
impl RepoHost for GithubHost {
    async fn commits_page(
        &self,
        repo: &RepoId,
        page: u32,
    ) -> Result<Vec<RemoteCommit>, FetchError> {
        let url = format!(
            "{}/repos/{}/commits?per_page={}&page={}",
            self.base_url, repo, PER_PAGE, page
        );
        let listing: Vec<CommitListItem> = self.get_json(&url).await?;

        let mut commits = Vec::with_capacity(listing.len());
        for item in listing {
            // Churn only appears on the per-commit detail endpoint.
            let detail_url = format!("{}/repos/{}/commits/{}", self.base_url, repo, item.sha);
            let detail: CommitDetail = self.get_json(&detail_url).await?;
            let (author, date) = match item.commit.author {
                Some(a) => (a.name.unwrap_or_default(), a.date),
                // No author metadata at all; the harvester drops the record
                // for its empty name, so the placeholder date is never kept.
                None => (String::new(), DateTime::<Utc>::UNIX_EPOCH),
            };
            commits.push(RemoteCommit {
                author,
                churn: detail.stats.map(|s| s.total).unwrap_or(0),
                date,
            });
        }
        Ok(commits)
    }

    async fn pull_requests_page(
        &self,
        repo: &RepoId,
        page: u32,
    ) -> Result<Vec<RemotePullRequest>, FetchError> {
        let url = format!(
            "{}/repos/{}/pulls?state=all&per_page={}&page={}",
            self.base_url, repo, PER_PAGE, page
        );
        let listing: Vec<PullListItem> = self.get_json(&url).await?;

        let mut pulls = Vec::with_capacity(listing.len());
        for item in listing {
            // `merged`, `additions` and `deletions` only appear on the
            // per-pull detail endpoint.
            let detail_url = format!("{}/repos/{}/pulls/{}", self.base_url, repo, item.number);
            let detail: PullDetail = self.get_json(&detail_url).await?;
            pulls.push(RemotePullRequest {
                author: detail.user.map(|u| u.login).unwrap_or_default(),
                additions: detail.additions,
                deletions: detail.deletions,
                merged: detail.merged,
                created_at: detail.created_at,
                merged_at: detail.merged_at,
            });
        }
        Ok(pulls)
    }

    async fn issues_page(&self, repo: &RepoId, page: u32) -> Result<Vec<RemoteIssue>, FetchError> {
        let url = format!(
            "{}/repos/{}/issues?state=all&per_page={}&page={}",
            self.base_url, repo, PER_PAGE, page
        );
        let listing: Vec<IssueListItem> = self.get_json(&url).await?;
        Ok(listing
            .into_iter()
            .map(|item| RemoteIssue {
                assignee: item.assignee.map(|u| u.login),
                created_at: item.created_at,
                closed_at: item.closed_at,
            })
            .collect())
    }
}
