//! SQLite-backed [`Store`] implementation.
//!
//! Every write runs inside one transaction and upserts on the table's
//! natural key (`ON CONFLICT … DO UPDATE`), returning the stored handles.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{
    Collaborator, Commit, CommunityProfile, Contribution, ExternalContribution, Identifier, Issue,
    Member, Organisation, PullRequest, Repository, StoredOrganisation, StoredRecord,
    StoredRepository,
};

use super::{require, Entity, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn resolve_repository(&self, ident: Option<&Identifier>) -> Result<i64> {
        let ident = require(ident, "repository")?;
        let id: Option<i64> = match ident {
            Identifier::Id(id) => {
                sqlx::query_scalar("SELECT id FROM repositories WHERE id = ?")
                    .bind(*id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Identifier::Name(name) => {
                sqlx::query_scalar("SELECT id FROM repositories WHERE name = ? ORDER BY id LIMIT 1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        id.ok_or_else(|| anyhow::anyhow!("repository {} is not stored", ident))
    }

    async fn resolve_organisation_login(&self, ident: Option<&Identifier>) -> Result<String> {
        match require(ident, "organisation")? {
            Identifier::Name(login) => Ok(login.clone()),
            Identifier::Id(id) => {
                let login: Option<String> =
                    sqlx::query_scalar("SELECT login FROM organisations WHERE id = ?")
                        .bind(*id)
                        .fetch_optional(&self.pool)
                        .await?;
                login.ok_or_else(|| anyhow::anyhow!("organisation #{} is not stored", id))
            }
        }
    }
}

fn ts(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

#[async_trait]
impl Store for SqliteStore {
    async fn write_organisation(&self, org: &Organisation) -> Result<StoredOrganisation> {
        sqlx::query(
            r#"
            INSERT INTO organisations (id, login, name, description, public_repos, followers,
                                       html_url, created_at, harvested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                login = excluded.login,
                name = excluded.name,
                description = excluded.description,
                public_repos = excluded.public_repos,
                followers = excluded.followers,
                html_url = excluded.html_url,
                created_at = excluded.created_at,
                harvested_at = excluded.harvested_at
            "#,
        )
        .bind(org.id)
        .bind(&org.login)
        .bind(&org.name)
        .bind(&org.description)
        .bind(org.public_repos)
        .bind(org.followers)
        .bind(&org.html_url)
        .bind(ts(&org.created_at))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(StoredOrganisation {
            id: org.id,
            login: org.login.clone(),
            name: org.name.clone(),
        })
    }

    async fn write_members(
        &self,
        members: &[Member],
        org: &StoredOrganisation,
    ) -> Result<Vec<StoredRecord>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(members.len());

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO members (id, organisation_id, login, site_admin, avatar_url)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id, organisation_id) DO UPDATE SET
                    login = excluded.login,
                    site_admin = excluded.site_admin,
                    avatar_url = excluded.avatar_url
                "#,
            )
            .bind(member.id)
            .bind(org.id)
            .bind(&member.login)
            .bind(member.site_admin)
            .bind(&member.avatar_url)
            .execute(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id: member.id,
                name: member.login.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_repositories(
        &self,
        repos: &[Repository],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRepository>> {
        let organisation = self.resolve_organisation_login(org).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(repos.len());

        for repo in repos {
            sqlx::query(
                r#"
                INSERT INTO repositories (id, name, full_name, organisation, description, fork,
                                          private, stars, forks, watchers, open_issues, language,
                                          html_url, created_at, updated_at, pushed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    full_name = excluded.full_name,
                    organisation = excluded.organisation,
                    description = excluded.description,
                    fork = excluded.fork,
                    private = excluded.private,
                    stars = excluded.stars,
                    forks = excluded.forks,
                    watchers = excluded.watchers,
                    open_issues = excluded.open_issues,
                    language = excluded.language,
                    html_url = excluded.html_url,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    pushed_at = excluded.pushed_at
                "#,
            )
            .bind(repo.id)
            .bind(&repo.name)
            .bind(&repo.full_name)
            .bind(&organisation)
            .bind(&repo.description)
            .bind(repo.fork)
            .bind(repo.private)
            .bind(repo.stargazers_count)
            .bind(repo.forks_count)
            .bind(repo.watchers_count)
            .bind(repo.open_issues_count)
            .bind(&repo.language)
            .bind(&repo.html_url)
            .bind(ts(&repo.created_at))
            .bind(ts(&repo.updated_at))
            .bind(ts(&repo.pushed_at))
            .execute(&mut *tx)
            .await?;

            stored.push(StoredRepository {
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
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_community_profiles(
        &self,
        profiles: &[CommunityProfile],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let repository_id = self.resolve_repository(repo).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(profiles.len());

        for profile in profiles {
            sqlx::query(
                r#"
                INSERT INTO community_profiles (repository_id, health_percentage,
                    has_code_of_conduct, has_contributing, has_issue_template,
                    has_pull_request_template, has_license, has_readme, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(repository_id) DO UPDATE SET
                    health_percentage = excluded.health_percentage,
                    has_code_of_conduct = excluded.has_code_of_conduct,
                    has_contributing = excluded.has_contributing,
                    has_issue_template = excluded.has_issue_template,
                    has_pull_request_template = excluded.has_pull_request_template,
                    has_license = excluded.has_license,
                    has_readme = excluded.has_readme,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(repository_id)
            .bind(profile.health_percentage)
            .bind(profile.files.has_code_of_conduct())
            .bind(profile.files.has_contributing())
            .bind(profile.files.has_issue_template())
            .bind(profile.files.has_pull_request_template())
            .bind(profile.files.has_license())
            .bind(profile.files.has_readme())
            .bind(ts(&profile.updated_at))
            .execute(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id: repository_id,
                name: format!("health {}%", profile.health_percentage),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_pull_requests(
        &self,
        pulls: &[PullRequest],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let repository_id = self.resolve_repository(repo).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(pulls.len());

        for pr in pulls {
            sqlx::query(
                r#"
                INSERT INTO pull_requests (id, repository_id, number, title, state, author,
                                           created_at, updated_at, closed_at, merged_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    state = excluded.state,
                    author = excluded.author,
                    updated_at = excluded.updated_at,
                    closed_at = excluded.closed_at,
                    merged_at = excluded.merged_at
                "#,
            )
            .bind(pr.id)
            .bind(repository_id)
            .bind(pr.number)
            .bind(&pr.title)
            .bind(&pr.state)
            .bind(pr.user.as_ref().map(|u| u.login.clone()))
            .bind(ts(&pr.created_at))
            .bind(ts(&pr.updated_at))
            .bind(ts(&pr.closed_at))
            .bind(ts(&pr.merged_at))
            .execute(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id: pr.id,
                name: pr.title.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_commits(
        &self,
        commits: &[Commit],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let repository_id = self.resolve_repository(repo).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(commits.len());

        for commit in commits {
            let signature = commit.commit.author.as_ref();
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO commits (repository_id, sha, message, author_login, author_name,
                                     author_email, committed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(repository_id, sha) DO UPDATE SET
                    message = excluded.message,
                    author_login = excluded.author_login,
                    author_name = excluded.author_name,
                    author_email = excluded.author_email,
                    committed_at = excluded.committed_at
                RETURNING id
                "#,
            )
            .bind(repository_id)
            .bind(&commit.sha)
            .bind(&commit.commit.message)
            .bind(commit.author.as_ref().map(|u| u.login.clone()))
            .bind(signature.and_then(|s| s.name.clone()))
            .bind(signature.and_then(|s| s.email.clone()))
            .bind(signature.and_then(|s| ts(&s.date)))
            .fetch_one(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id,
                name: commit.sha.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_collaborators(
        &self,
        collaborators: &[Collaborator],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let repository_id = self.resolve_repository(repo).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(collaborators.len());

        for collaborator in collaborators {
            let role = collaborator
                .permissions
                .as_ref()
                .map(|p| p.role())
                .unwrap_or("none");

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO collaborators (repository_id, user_id, login, role)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(repository_id, login) DO UPDATE SET
                    user_id = excluded.user_id,
                    role = excluded.role
                RETURNING id
                "#,
            )
            .bind(repository_id)
            .bind(collaborator.id)
            .bind(&collaborator.login)
            .bind(role)
            .fetch_one(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id,
                name: collaborator.login.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_contributions(
        &self,
        contributions: &[Contribution],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let repository_id = self.resolve_repository(repo).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(contributions.len());

        // Anonymous contributors have no login to key on
        for contribution in contributions {
            let Some(login) = contribution.login.as_ref() else {
                continue;
            };

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO contributions (repository_id, user_id, login, contributions)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(repository_id, login) DO UPDATE SET
                    user_id = excluded.user_id,
                    contributions = excluded.contributions
                RETURNING id
                "#,
            )
            .bind(repository_id)
            .bind(contribution.id)
            .bind(login)
            .bind(contribution.contributions)
            .fetch_one(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id,
                name: login.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_issues(
        &self,
        issues: &[Issue],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let organisation = self.resolve_organisation_login(org).await?;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(issues.len());

        for issue in issues {
            sqlx::query(
                r#"
                INSERT INTO issues (id, organisation, repository, number, title, state, author,
                                    is_pull_request, created_at, closed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    repository = excluded.repository,
                    title = excluded.title,
                    state = excluded.state,
                    author = excluded.author,
                    is_pull_request = excluded.is_pull_request,
                    closed_at = excluded.closed_at
                "#,
            )
            .bind(issue.id)
            .bind(&organisation)
            .bind(issue.repository_name())
            .bind(issue.number)
            .bind(&issue.title)
            .bind(&issue.state)
            .bind(issue.user.as_ref().map(|u| u.login.clone()))
            .bind(issue.is_pull_request())
            .bind(ts(&issue.created_at))
            .bind(ts(&issue.closed_at))
            .execute(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id: issue.id,
                name: issue.title.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn write_external_contributions(
        &self,
        contributions: &[ExternalContribution],
        _parent: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(contributions.len());

        for contribution in contributions {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO external_contributions (project_org, project_name, login, contributions)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(project_org, project_name, login) DO UPDATE SET
                    contributions = excluded.contributions
                RETURNING id
                "#,
            )
            .bind(&contribution.project_org)
            .bind(&contribution.project_name)
            .bind(&contribution.login)
            .bind(contribution.contributions)
            .fetch_one(&mut *tx)
            .await?;

            stored.push(StoredRecord {
                id,
                name: contribution.login.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_stray_external_contributions(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM external_contributions WHERE login NOT IN (SELECT login FROM members)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self, entity: Entity) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", entity.table()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
