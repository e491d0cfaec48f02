//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Mirrors the SQLite backend's upsert keys and pruning rule using
//! `BTreeMap`s behind a single `std::sync::RwLock`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Collaborator, Commit, CommunityProfile, Contribution, ExternalContribution, Identifier, Issue,
    Member, Organisation, PullRequest, Repository, StoredOrganisation, StoredRecord,
    StoredRepository,
};

use super::{require, Entity, Store};

#[derive(Default)]
struct State {
    organisations: BTreeMap<i64, StoredOrganisation>,
    /// (organisation id, user id) → login
    members: BTreeMap<(i64, i64), String>,
    repositories: BTreeMap<i64, StoredRepository>,
    community_profiles: BTreeMap<i64, i64>,
    /// pull request id → repository id
    pull_requests: BTreeMap<i64, i64>,
    /// (repository id, sha) → row id
    commits: BTreeMap<(i64, String), i64>,
    /// issue id → organisation login
    issues: BTreeMap<i64, String>,
    collaborators: BTreeMap<(i64, String), i64>,
    contributions: BTreeMap<(i64, String), i64>,
    /// (project org, project name, login) → (row id, contributions)
    external_contributions: BTreeMap<(String, String, String), (i64, i64)>,
    next_row_id: i64,
}

impl State {
    fn row_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn resolve_repository(&self, ident: Option<&Identifier>) -> Result<i64> {
        let ident = require(ident, "repository")?;
        let found = match ident {
            Identifier::Id(id) => self.repositories.get(id).map(|r| r.id),
            Identifier::Name(name) => self
                .repositories
                .values()
                .find(|r| &r.name == name)
                .map(|r| r.id),
        };
        found.ok_or_else(|| anyhow::anyhow!("repository {} is not stored", ident))
    }

    fn resolve_organisation_login(&self, ident: Option<&Identifier>) -> Result<String> {
        match require(ident, "organisation")? {
            Identifier::Name(login) => Ok(login.clone()),
            Identifier::Id(id) => self
                .organisations
                .get(id)
                .map(|o| o.login.clone())
                .ok_or_else(|| anyhow::anyhow!("organisation #{} is not stored", id)),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    /// Logins of the members stored for an organisation.
    pub fn member_logins(&self, organisation_id: i64) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .members
            .range((organisation_id, i64::MIN)..=(organisation_id, i64::MAX))
            .map(|(_, login)| login.clone())
            .collect())
    }

    pub fn repositories(&self) -> Result<Vec<StoredRepository>> {
        Ok(self.read()?.repositories.values().cloned().collect())
    }

    pub fn external_contributions(&self) -> Result<Vec<ExternalContribution>> {
        Ok(self
            .read()?
            .external_contributions
            .iter()
            .map(|((org, name, login), (_, contributions))| ExternalContribution {
                project_org: org.clone(),
                project_name: name.clone(),
                login: login.clone(),
                contributions: *contributions,
            })
            .collect())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn write_organisation(&self, org: &Organisation) -> Result<StoredOrganisation> {
        let stored = StoredOrganisation {
            id: org.id,
            login: org.login.clone(),
            name: org.name.clone(),
        };
        self.write()?.organisations.insert(org.id, stored.clone());
        Ok(stored)
    }

    async fn write_members(
        &self,
        members: &[Member],
        org: &StoredOrganisation,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        if !state.organisations.contains_key(&org.id) {
            anyhow::bail!("organisation #{} is not stored", org.id);
        }

        Ok(members
            .iter()
            .map(|m| {
                state.members.insert((org.id, m.id), m.login.clone());
                StoredRecord {
                    id: m.id,
                    name: m.login.clone(),
                }
            })
            .collect())
    }

    async fn write_repositories(
        &self,
        repos: &[Repository],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRepository>> {
        let mut state = self.write()?;
        let organisation = state.resolve_organisation_login(org)?;

        Ok(repos
            .iter()
            .map(|repo| {
                let stored = StoredRepository {
                    id: repo.id,
                    name: repo.name.clone(),
                    full_name: repo.full_name.clone(),
                    organisation: Some(organisation.clone()),
                    description: repo.description.clone(),
                    fork: repo.fork,
                    stars: repo.stargazers_count,
                    forks: repo.forks_count,
                    watchers: repo.watchers_count,
                    open_issues: repo.open_issues_count,
                    language: repo.language.clone(),
                    html_url: repo.html_url.clone(),
                };
                state.repositories.insert(repo.id, stored.clone());
                stored
            })
            .collect())
    }

    async fn write_community_profiles(
        &self,
        profiles: &[CommunityProfile],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let repository_id = state.resolve_repository(repo)?;

        Ok(profiles
            .iter()
            .map(|p| {
                state
                    .community_profiles
                    .insert(repository_id, p.health_percentage);
                StoredRecord {
                    id: repository_id,
                    name: format!("health {}%", p.health_percentage),
                }
            })
            .collect())
    }

    async fn write_pull_requests(
        &self,
        pulls: &[PullRequest],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let repository_id = state.resolve_repository(repo)?;

        Ok(pulls
            .iter()
            .map(|pr| {
                state.pull_requests.insert(pr.id, repository_id);
                StoredRecord {
                    id: pr.id,
                    name: pr.title.clone(),
                }
            })
            .collect())
    }

    async fn write_commits(
        &self,
        commits: &[Commit],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let repository_id = state.resolve_repository(repo)?;
        let mut stored = Vec::with_capacity(commits.len());

        for commit in commits {
            let key = (repository_id, commit.sha.clone());
            let existing = state.commits.get(&key).copied();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = state.row_id();
                    state.commits.insert(key, id);
                    id
                }
            };
            stored.push(StoredRecord {
                id,
                name: commit.sha.clone(),
            });
        }

        Ok(stored)
    }

    async fn write_collaborators(
        &self,
        collaborators: &[Collaborator],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let repository_id = state.resolve_repository(repo)?;
        let mut stored = Vec::with_capacity(collaborators.len());

        for collaborator in collaborators {
            let key = (repository_id, collaborator.login.clone());
            let existing = state.collaborators.get(&key).copied();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = state.row_id();
                    state.collaborators.insert(key, id);
                    id
                }
            };
            stored.push(StoredRecord {
                id,
                name: collaborator.login.clone(),
            });
        }

        Ok(stored)
    }

    async fn write_contributions(
        &self,
        contributions: &[Contribution],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let repository_id = state.resolve_repository(repo)?;
        let mut stored = Vec::with_capacity(contributions.len());

        for login in contributions.iter().filter_map(|c| c.login.as_ref()) {
            let key = (repository_id, login.clone());
            let existing = state.contributions.get(&key).copied();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = state.row_id();
                    state.contributions.insert(key, id);
                    id
                }
            };
            stored.push(StoredRecord {
                id,
                name: login.clone(),
            });
        }

        Ok(stored)
    }

    async fn write_issues(
        &self,
        issues: &[Issue],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let organisation = state.resolve_organisation_login(org)?;

        Ok(issues
            .iter()
            .map(|issue| {
                state.issues.insert(issue.id, organisation.clone());
                StoredRecord {
                    id: issue.id,
                    name: issue.title.clone(),
                }
            })
            .collect())
    }

    async fn write_external_contributions(
        &self,
        contributions: &[ExternalContribution],
        _parent: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut state = self.write()?;
        let mut stored = Vec::with_capacity(contributions.len());

        for c in contributions {
            let key = (
                c.project_org.clone(),
                c.project_name.clone(),
                c.login.clone(),
            );
            let existing = state.external_contributions.get(&key).map(|(id, _)| *id);
            let id = match existing {
                Some(id) => id,
                None => state.row_id(),
            };
            state
                .external_contributions
                .insert(key, (id, c.contributions));
            stored.push(StoredRecord {
                id,
                name: c.login.clone(),
            });
        }

        Ok(stored)
    }

    async fn delete_stray_external_contributions(&self) -> Result<u64> {
        let mut state = self.write()?;
        let members: BTreeSet<String> = state.members.values().cloned().collect();
        let before = state.external_contributions.len();
        state
            .external_contributions
            .retain(|(_, _, login), _| members.contains(login));
        Ok((before - state.external_contributions.len()) as u64)
    }

    async fn count(&self, entity: Entity) -> Result<i64> {
        let state = self.read()?;
        let n = match entity {
            Entity::Organisation => state.organisations.len(),
            Entity::Issue => state.issues.len(),
            Entity::Member => state.members.len(),
            Entity::PullRequest => state.pull_requests.len(),
            Entity::Repository => state.repositories.len(),
            Entity::Commit => state.commits.len(),
            Entity::CommunityProfile => state.community_profiles.len(),
            Entity::ExternalContribution => state.external_contributions.len(),
            Entity::Collaborator => state.collaborators.len(),
            Entity::Contribution => state.contributions.len(),
        };
        Ok(n as i64)
    }
}
