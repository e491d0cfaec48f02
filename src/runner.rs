//! Task runner.
//!
//! One [`TaskRunner::run`] call is one fetch-then-persist unit: fetch the
//! resource from the [`RemoteSource`], hand it to the matching [`Store`]
//! write, and record the wall-clock duration in the [`TimerTree`]. Errors
//! stop here. They come back as [`TaskOutcome::Failed`] and the caller
//! decides what to do next.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::{StoredOrganisation, StoredRecord, StoredRepository};
use crate::source::RemoteSource;
use crate::store::Store;
use crate::tasks::{ResourceKind, TaskParam};
use crate::timer::TimerTree;

/// What a successful task persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Organisation(StoredOrganisation),
    Repositories(Vec<StoredRepository>),
    Records(Vec<StoredRecord>),
}

impl Persisted {
    pub fn len(&self) -> usize {
        match self {
            Persisted::Organisation(_) => 1,
            Persisted::Repositories(repos) => repos.len(),
            Persisted::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Persisted),
    Failed(String),
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    /// Stored organisation handle of a completed `OrgDetails` task.
    pub fn into_organisation(self) -> Option<StoredOrganisation> {
        match self {
            TaskOutcome::Completed(Persisted::Organisation(org)) => Some(org),
            _ => None,
        }
    }

    /// Stored repositories of a completed `Repos` task; empty otherwise.
    pub fn into_repositories(self) -> Vec<StoredRepository> {
        match self {
            TaskOutcome::Completed(Persisted::Repositories(repos)) => repos,
            _ => Vec::new(),
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            TaskOutcome::Failed(reason) => Some(reason),
            TaskOutcome::Completed(_) => None,
        }
    }
}

pub struct TaskRunner<'a> {
    source: &'a dyn RemoteSource,
    store: &'a dyn Store,
}

impl<'a> TaskRunner<'a> {
    pub fn new(source: &'a dyn RemoteSource, store: &'a dyn Store) -> Self {
        Self { source, store }
    }

    /// Fetch and persist `kind` for `scope`, timing the whole attempt.
    ///
    /// `scope` is the organisation login the timing is filed under; scopes
    /// that are not an open organisation in `timer` are summed into the
    /// external bucket.
    pub async fn run(
        &self,
        timer: &mut TimerTree,
        kind: ResourceKind,
        scope: &str,
        param: TaskParam<'_>,
    ) -> TaskOutcome {
        let started = Instant::now();
        let result = self.execute(kind, scope, param).await;
        timer.record_task(scope, kind.name(), started.elapsed());

        match result {
            Ok(persisted) => {
                debug!(
                    org = scope,
                    task = kind.name(),
                    repo = param.name_hint().unwrap_or(""),
                    records = persisted.len(),
                    "task completed"
                );
                TaskOutcome::Completed(persisted)
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(
                    org = scope,
                    task = kind.name(),
                    repo = param.name_hint().unwrap_or(""),
                    reason = %reason,
                    "task failed"
                );
                TaskOutcome::Failed(reason)
            }
        }
    }

    async fn execute(
        &self,
        kind: ResourceKind,
        scope: &str,
        param: TaskParam<'_>,
    ) -> Result<Persisted> {
        let ident = param.identifier();
        let ident = ident.as_ref();

        let persisted = match kind {
            ResourceKind::OrgDetails => {
                let org = self.source.organisation(scope).await?;
                Persisted::Organisation(self.store.write_organisation(&org).await?)
            }
            ResourceKind::Members => {
                let members = self.source.members(scope).await?;
                let handle = match param {
                    TaskParam::StoredOrganisation(Some(handle)) => handle,
                    _ => anyhow::bail!(
                        "no stored organisation for {}; organisation details were not persisted",
                        scope
                    ),
                };
                Persisted::Records(self.store.write_members(&members, handle).await?)
            }
            ResourceKind::Repos => {
                let repos = self.source.repositories(scope).await?;
                Persisted::Repositories(self.store.write_repositories(&repos, ident).await?)
            }
            ResourceKind::CommunityProfile => {
                let repo = repository_name(kind, param)?;
                let profiles = self.source.community_profile(scope, repo).await?;
                Persisted::Records(self.store.write_community_profiles(&profiles, ident).await?)
            }
            ResourceKind::PullRequests => {
                let repo = repository_name(kind, param)?;
                let pulls = self.source.pull_requests(scope, repo).await?;
                Persisted::Records(self.store.write_pull_requests(&pulls, ident).await?)
            }
            ResourceKind::Commits => {
                let repo = repository_name(kind, param)?;
                let commits = self.source.commits(scope, repo).await?;
                Persisted::Records(self.store.write_commits(&commits, ident).await?)
            }
            ResourceKind::Collaborators => {
                let repo = repository_name(kind, param)?;
                let collaborators = self.source.collaborators(scope, repo).await?;
                Persisted::Records(self.store.write_collaborators(&collaborators, ident).await?)
            }
            ResourceKind::Contributions => {
                let repo = repository_name(kind, param)?;
                let contributions = self.source.contributions(scope, repo).await?;
                Persisted::Records(self.store.write_contributions(&contributions, ident).await?)
            }
            ResourceKind::Issues => {
                let issues = self.source.issues(scope).await?;
                Persisted::Records(self.store.write_issues(&issues, ident).await?)
            }
            ResourceKind::ExternalContributions => {
                let project = param
                    .name_hint()
                    .context("external contributions need a project name")?;
                let contributions = self.source.external_contributions(scope, project).await?;
                Persisted::Records(
                    self.store
                        .write_external_contributions(&contributions, ident)
                        .await?,
                )
            }
        };

        Ok(persisted)
    }
}

fn repository_name<'p>(kind: ResourceKind, param: TaskParam<'p>) -> Result<&'p str> {
    param
        .name_hint()
        .with_context(|| format!("{} needs a repository", kind))
}
