//! GitHub REST API client.
//!
//! Implements [`RemoteSource`] on top of `reqwest`. Every list endpoint is
//! paginated by following the `Link: <…>; rel="next"` header until it
//! disappears.
//!
//! # Authentication
//!
//! Requests carry `Authorization: Bearer <token>`, the configured
//! `User-Agent` and `Accept: application/vnd.github+json`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, … capped at 32s)
//! - Network errors → retry
//! - HTTP 403/429 with `x-ratelimit-remaining: 0` → sleep until
//!   `x-ratelimit-reset` (bounded by `max_rate_limit_wait_secs`), then retry
//! - Other 4xx → fail immediately
//!
//! # Empty Responses
//!
//! | Endpoint | Status | Meaning |
//! |----------|--------|---------|
//! | any list | 204 | no content (e.g. contributors of an empty repo) |
//! | commits | 409 | repository is empty |
//! | community profile | 404 | no profile available |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GithubConfig;
use crate::models::{
    Collaborator, Commit, CommunityProfile, Contribution, ExternalContribution, Issue, Member,
    Organisation, OrganisationSummary, PullRequest, Repository,
};
use crate::source::RemoteSource;

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    per_page: u32,
    max_retries: u32,
    max_rate_limit_wait: Duration,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            per_page: config.per_page,
            max_retries: config.max_retries,
            max_rate_limit_wait: Duration::from_secs(config.max_rate_limit_wait_secs),
        })
    }

    fn list_url(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let per_page = self.per_page.to_string();
        let mut params: Vec<(&str, &str)> = query.to_vec();
        params.push(("per_page", &per_page));
        let url = Url::parse_with_params(&format!("{}{}", self.base_url, path), &params)
            .with_context(|| format!("Invalid GitHub URL for path {}", path))?;
        Ok(url.to_string())
    }

    /// Issue a GET with retry. Returns `None` when the response status means
    /// "nothing here" (204, or one of `empty_on`).
    async fn request(&self, url: &str, empty_on: &[StatusCode]) -> Result<Option<reqwest::Response>> {
        let mut last_err = None;
        let mut next_delay: Option<Duration> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = next_delay
                    .take()
                    .unwrap_or_else(|| Duration::from_secs(1 << (attempt - 1).min(5)));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .header(ACCEPT, GITHUB_MEDIA_TYPE)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::NO_CONTENT || empty_on.contains(&status) {
                        debug!(%url, %status, "empty response");
                        return Ok(None);
                    }

                    if status.is_success() {
                        return Ok(Some(response));
                    }

                    let now = chrono::Utc::now().timestamp();
                    if let Some(wait) = rate_limit_wait(status, response.headers(), now) {
                        if wait > self.max_rate_limit_wait {
                            bail!(
                                "GitHub rate limit exhausted; reset in {}s exceeds the {}s wait cap",
                                wait.as_secs(),
                                self.max_rate_limit_wait.as_secs()
                            );
                        }
                        warn!(%url, wait_secs = wait.as_secs(), "rate limited, waiting for reset");
                        next_delay = Some(wait);
                        last_err = Some(anyhow::anyhow!("GitHub API rate limited ({})", status));
                        continue;
                    }

                    // Rate limited or server error, retry
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%url, %status, attempt, "transient GitHub API error");
                        last_err = Some(anyhow::anyhow!(
                            "GitHub API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not rate limiting), don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("GitHub API error {} for {}: {}", status, url, body_text);
                }
                Err(e) => {
                    warn!(%url, attempt, error = %e, "GitHub request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("GitHub request failed after retries")))
    }

    async fn get_one<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .request(&url, &[])
            .await?
            .ok_or_else(|| anyhow::anyhow!("GitHub returned no content for {}", url))?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }

    /// Fetch every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        empty_on: &[StatusCode],
    ) -> Result<Vec<T>> {
        let mut url = self.list_url(path, query)?;
        let mut items = Vec::new();

        loop {
            let Some(response) = self.request(&url, empty_on).await? else {
                break;
            };

            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_url);

            let page: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to decode response from {}", url))?;
            items.extend(page);

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        Ok(items)
    }
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        if segments.any(|s| s.trim() == "rel=\"next\"") {
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}

/// How long to wait before retrying a rate-limited response, if it is one.
///
/// Primary limits report `x-ratelimit-remaining: 0` plus an epoch reset
/// time; secondary limits send `retry-after` seconds.
pub fn rate_limit_wait(status: StatusCode, headers: &HeaderMap, now: i64) -> Option<Duration> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header(RETRY_AFTER.as_str()).and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    if header("x-ratelimit-remaining").map(str::trim) == Some("0") {
        let reset = header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(now);
        return Some(Duration::from_secs((reset - now).max(0) as u64 + 1));
    }

    None
}

#[async_trait]
impl RemoteSource for GithubClient {
    async fn organisations(&self) -> Result<Vec<OrganisationSummary>> {
        self.get_all("/user/orgs", &[], &[]).await
    }

    async fn organisation(&self, org: &str) -> Result<Organisation> {
        self.get_one(&format!("/orgs/{}", org)).await
    }

    async fn members(&self, org: &str) -> Result<Vec<Member>> {
        self.get_all(&format!("/orgs/{}/members", org), &[], &[])
            .await
    }

    async fn repositories(&self, org: &str) -> Result<Vec<Repository>> {
        self.get_all(&format!("/orgs/{}/repos", org), &[("type", "all")], &[])
            .await
    }

    async fn community_profile(&self, org: &str, repo: &str) -> Result<Vec<CommunityProfile>> {
        let url = format!("{}/repos/{}/{}/community/profile", self.base_url, org, repo);
        match self.request(&url, &[StatusCode::NOT_FOUND]).await? {
            Some(response) => {
                let profile: CommunityProfile = response
                    .json()
                    .await
                    .with_context(|| format!("Failed to decode response from {}", url))?;
                Ok(vec![profile])
            }
            None => Ok(Vec::new()),
        }
    }

    async fn pull_requests(&self, org: &str, repo: &str) -> Result<Vec<PullRequest>> {
        self.get_all(
            &format!("/repos/{}/{}/pulls", org, repo),
            &[("state", "all")],
            &[],
        )
        .await
    }

    async fn commits(&self, org: &str, repo: &str) -> Result<Vec<Commit>> {
        self.get_all(
            &format!("/repos/{}/{}/commits", org, repo),
            &[],
            &[StatusCode::CONFLICT],
        )
        .await
    }

    async fn collaborators(&self, org: &str, repo: &str) -> Result<Vec<Collaborator>> {
        self.get_all(&format!("/repos/{}/{}/collaborators", org, repo), &[], &[])
            .await
    }

    async fn contributions(&self, org: &str, repo: &str) -> Result<Vec<Contribution>> {
        self.get_all(&format!("/repos/{}/{}/contributors", org, repo), &[], &[])
            .await
    }

    async fn issues(&self, org: &str) -> Result<Vec<Issue>> {
        self.get_all(
            &format!("/orgs/{}/issues", org),
            &[("filter", "all"), ("state", "all")],
            &[],
        )
        .await
    }

    async fn external_contributions(
        &self,
        org: &str,
        project: &str,
    ) -> Result<Vec<ExternalContribution>> {
        let contributors: Vec<Contribution> = self
            .get_all(&format!("/repos/{}/{}/contributors", org, project), &[], &[])
            .await?;

        Ok(contributors
            .into_iter()
            .filter_map(|c| {
                c.login.map(|login| ExternalContribution {
                    project_org: org.to_string(),
                    project_name: project.to_string(),
                    login,
                    contributions: c.contributions,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn next_page_found_among_relations() {
        let link = r#"<https://api.github.com/orgs/acme/repos?page=2>; rel="next", <https://api.github.com/orgs/acme/repos?page=5>; rel="last""#;
        assert_eq!(
            next_page_url(link).as_deref(),
            Some("https://api.github.com/orgs/acme/repos?page=2")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let link = r#"<https://api.github.com/orgs/acme/repos?page=1>; rel="first", <https://api.github.com/orgs/acme/repos?page=4>; rel="prev""#;
        assert_eq!(next_page_url(link), None);
        assert_eq!(next_page_url(""), None);
    }

    #[test]
    fn exhausted_primary_limit_waits_until_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1060"));
        let wait = rate_limit_wait(StatusCode::FORBIDDEN, &headers, 1000);
        assert_eq!(wait, Some(Duration::from_secs(61)));
    }

    #[test]
    fn retry_after_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let wait = rate_limit_wait(StatusCode::TOO_MANY_REQUESTS, &headers, 0);
        assert_eq!(wait, Some(Duration::from_secs(7)));
    }

    #[test]
    fn plain_forbidden_is_not_rate_limiting() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
        assert_eq!(rate_limit_wait(StatusCode::FORBIDDEN, &headers, 0), None);
        assert_eq!(rate_limit_wait(StatusCode::NOT_FOUND, &HeaderMap::new(), 0), None);
    }

    #[test]
    fn list_url_appends_per_page() {
        let mut cfg = GithubConfig::default();
        cfg.api_url = "http://127.0.0.1:9/".to_string();
        cfg.per_page = 50;
        let client = GithubClient::new(&cfg, "t").unwrap();
        let url = client.list_url("/orgs/acme/repos", &[("type", "all")]).unwrap();
        assert_eq!(url, "http://127.0.0.1:9/orgs/acme/repos?type=all&per_page=50");
    }
}
