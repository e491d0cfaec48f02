//! Remote data source abstraction.
//!
//! [`RemoteSource`] is the contract the harvest engine consumes: one fetch
//! capability per resource kind, each returning the fully decoded
//! collection. Pagination, rate limiting and authentication are the
//! implementor's concern. [`GithubClient`](crate::github::GithubClient) is
//! the production implementation; tests plug in scripted fakes.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Collaborator, Commit, CommunityProfile, Contribution, ExternalContribution, Issue, Member,
    Organisation, OrganisationSummary, PullRequest, Repository,
};

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// All organisations visible to the current credential, in API order.
    async fn organisations(&self) -> Result<Vec<OrganisationSummary>>;

    async fn organisation(&self, org: &str) -> Result<Organisation>;

    async fn members(&self, org: &str) -> Result<Vec<Member>>;

    async fn repositories(&self, org: &str) -> Result<Vec<Repository>>;

    /// Zero or one profile; repositories without one yield an empty list.
    async fn community_profile(&self, org: &str, repo: &str) -> Result<Vec<CommunityProfile>>;

    async fn pull_requests(&self, org: &str, repo: &str) -> Result<Vec<PullRequest>>;

    async fn commits(&self, org: &str, repo: &str) -> Result<Vec<Commit>>;

    async fn collaborators(&self, org: &str, repo: &str) -> Result<Vec<Collaborator>>;

    async fn contributions(&self, org: &str, repo: &str) -> Result<Vec<Contribution>>;

    /// Issues across every repository of the organisation.
    async fn issues(&self, org: &str) -> Result<Vec<Issue>>;

    /// Contributors of a project outside the monitored organisations.
    async fn external_contributions(
        &self,
        org: &str,
        project: &str,
    ) -> Result<Vec<ExternalContribution>>;
}
