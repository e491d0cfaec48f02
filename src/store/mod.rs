//! Storage abstraction for harvested data.
//!
//! The [`Store`] trait exposes one batch write per resource kind. Each write
//! upserts on the record's natural key and returns the stored handles, so
//! re-running a harvest never duplicates rows.
//!
//! Implementations:
//! - [`sqlite::SqliteStore`]: production backend over `sqlx`
//! - [`memory::InMemoryStore`]: `RwLock`-guarded maps for tests
//!
//! # Operations
//!
//! | Method | Parent association |
//! |--------|--------------------|
//! | [`write_organisation`](Store::write_organisation) | none |
//! | [`write_members`](Store::write_members) | full stored organisation handle |
//! | [`write_repositories`](Store::write_repositories) | organisation identifier |
//! | [`write_community_profiles`](Store::write_community_profiles) | repository identifier |
//! | [`write_pull_requests`](Store::write_pull_requests) | repository identifier |
//! | [`write_commits`](Store::write_commits) | repository identifier |
//! | [`write_collaborators`](Store::write_collaborators) | repository identifier |
//! | [`write_contributions`](Store::write_contributions) | repository identifier |
//! | [`write_issues`](Store::write_issues) | organisation identifier |
//! | [`write_external_contributions`](Store::write_external_contributions) | none |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Collaborator, Commit, CommunityProfile, Contribution, ExternalContribution, Identifier, Issue,
    Member, Organisation, PullRequest, Repository, StoredOrganisation, StoredRecord,
    StoredRepository,
};

/// Stored entity types, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Organisation,
    Issue,
    Member,
    PullRequest,
    Repository,
    Commit,
    CommunityProfile,
    ExternalContribution,
    Collaborator,
    Contribution,
}

impl Entity {
    pub const ALL: [Entity; 10] = [
        Entity::Organisation,
        Entity::Issue,
        Entity::Member,
        Entity::PullRequest,
        Entity::Repository,
        Entity::Commit,
        Entity::CommunityProfile,
        Entity::ExternalContribution,
        Entity::Collaborator,
        Entity::Contribution,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Entity::Organisation => "Organisation",
            Entity::Issue => "Issue",
            Entity::Member => "Member",
            Entity::PullRequest => "PullRequest",
            Entity::Repository => "Repository",
            Entity::Commit => "Commit",
            Entity::CommunityProfile => "CommunityProfile",
            Entity::ExternalContribution => "ExternalContribution",
            Entity::Collaborator => "Collaborator",
            Entity::Contribution => "Contribution",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Entity::Organisation => "organisations",
            Entity::Issue => "issues",
            Entity::Member => "members",
            Entity::PullRequest => "pull_requests",
            Entity::Repository => "repositories",
            Entity::Commit => "commits",
            Entity::CommunityProfile => "community_profiles",
            Entity::ExternalContribution => "external_contributions",
            Entity::Collaborator => "collaborators",
            Entity::Contribution => "contributions",
        }
    }
}

/// Persistence backend for the harvester.
///
/// Writes taking an `Option<&Identifier>` fail when the identifier is
/// missing or does not resolve to a stored parent, except
/// [`write_external_contributions`](Store::write_external_contributions),
/// which has no parent.
#[async_trait]
pub trait Store: Send + Sync {
    async fn write_organisation(&self, org: &Organisation) -> Result<StoredOrganisation>;

    async fn write_members(
        &self,
        members: &[Member],
        org: &StoredOrganisation,
    ) -> Result<Vec<StoredRecord>>;

    /// Returns the full stored rows; callers trim them to
    /// [`RepositoryRef`](crate::models::RepositoryRef)s.
    async fn write_repositories(
        &self,
        repos: &[Repository],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRepository>>;

    async fn write_community_profiles(
        &self,
        profiles: &[CommunityProfile],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    async fn write_pull_requests(
        &self,
        pulls: &[PullRequest],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    async fn write_commits(
        &self,
        commits: &[Commit],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    async fn write_collaborators(
        &self,
        collaborators: &[Collaborator],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    async fn write_contributions(
        &self,
        contributions: &[Contribution],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    async fn write_issues(
        &self,
        issues: &[Issue],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    async fn write_external_contributions(
        &self,
        contributions: &[ExternalContribution],
        parent: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>>;

    /// Remove external contributions whose author is not a member of any
    /// stored organisation. Returns the number of rows removed.
    async fn delete_stray_external_contributions(&self) -> Result<u64>;

    async fn count(&self, entity: Entity) -> Result<i64>;
}

pub(crate) fn require<'a>(ident: Option<&'a Identifier>, what: &str) -> Result<&'a Identifier> {
    ident.ok_or_else(|| anyhow::anyhow!("{} identifier is required", what))
}
