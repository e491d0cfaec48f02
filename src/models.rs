//! Core data models used throughout the harvester.
//!
//! Two families of types live here: payloads decoded from the GitHub REST
//! API (deserialized straight from JSON, unknown fields ignored) and the
//! handles a [`Store`](crate::store::Store) returns after persisting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Remote payloads
// ═══════════════════════════════════════════════════════════════════════

/// Entry of the organisation listing (`GET /user/orgs`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OrganisationSummary {
    pub id: i64,
    pub login: String,
}

/// Full organisation details (`GET /orgs/{org}`).
#[derive(Debug, Clone, Deserialize)]
pub struct Organisation {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public_repos: i64,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Minimal user reference embedded in pull requests, issues and commits.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub id: Option<i64>,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub site_admin: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    #[serde(default)]
    pub watchers_count: i64,
    #[serde(default)]
    pub open_issues_count: i64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Community health profile (`GET /repos/{org}/{repo}/community/profile`).
#[derive(Debug, Clone, Deserialize)]
pub struct CommunityProfile {
    #[serde(default)]
    pub health_percentage: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub files: CommunityFiles,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Presence markers for the community files. GitHub reports a missing file
/// as `null`, a present one as an object describing it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityFiles {
    #[serde(default)]
    pub code_of_conduct: Option<serde_json::Value>,
    #[serde(default)]
    pub contributing: Option<serde_json::Value>,
    #[serde(default)]
    pub issue_template: Option<serde_json::Value>,
    #[serde(default)]
    pub pull_request_template: Option<serde_json::Value>,
    #[serde(default)]
    pub license: Option<serde_json::Value>,
    #[serde(default)]
    pub readme: Option<serde_json::Value>,
}

impl CommunityFiles {
    pub fn has_code_of_conduct(&self) -> bool {
        present(&self.code_of_conduct)
    }
    pub fn has_contributing(&self) -> bool {
        present(&self.contributing)
    }
    pub fn has_issue_template(&self) -> bool {
        present(&self.issue_template)
    }
    pub fn has_pull_request_template(&self) -> bool {
        present(&self.pull_request_template)
    }
    pub fn has_license(&self) -> bool {
        present(&self.license)
    }
    pub fn has_readme(&self) -> bool {
        present(&self.readme)
    }
}

fn present(v: &Option<serde_json::Value>) -> bool {
    matches!(v, Some(value) if !value.is_null())
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub commit: CommitDetail,
    /// GitHub account of the author; absent when the commit email is not
    /// linked to any account.
    #[serde(default)]
    pub author: Option<UserRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    #[serde(default)]
    pub author: Option<GitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSignature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collaborator {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

impl Permissions {
    /// Highest permission held, as a role label.
    pub fn role(&self) -> &'static str {
        if self.admin {
            "admin"
        } else if self.push {
            "write"
        } else if self.pull {
            "read"
        } else {
            "none"
        }
    }
}

/// Contributor entry (`GET /repos/{org}/{repo}/contributors`).
///
/// Anonymous contributors carry no login; stores skip them.
#[derive(Debug, Clone, Deserialize)]
pub struct Contribution {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub login: Option<String>,
    pub contributions: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// Present when the issue is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        present(&self.pull_request)
    }

    /// Repository name parsed from `repository_url`
    /// (`https://api.github.com/repos/{org}/{repo}`).
    pub fn repository_name(&self) -> Option<&str> {
        self.repository_url
            .as_deref()
            .and_then(|url| url.rsplit('/').next())
            .filter(|s| !s.is_empty())
    }
}

/// Contributor of a project outside the monitored organisations, tagged with
/// the project it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalContribution {
    pub project_org: String,
    pub project_name: String,
    pub login: String,
    pub contributions: i64,
}

// ═══════════════════════════════════════════════════════════════════════
// Stored handles
// ═══════════════════════════════════════════════════════════════════════

/// Handle returned after persisting an organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredOrganisation {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
}

/// Generic handle returned by batch writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub name: String,
}

/// Full persisted repository row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRepository {
    pub id: i64,
    pub name: String,
    pub full_name: Option<String>,
    pub organisation: Option<String>,
    pub description: Option<String>,
    pub fork: bool,
    pub stars: i64,
    pub forks: i64,
    pub watchers: i64,
    pub open_issues: i64,
    pub language: Option<String>,
    pub html_url: Option<String>,
}

impl StoredRepository {
    pub fn trim(&self) -> RepositoryRef {
        RepositoryRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Trimmed `{id, name}` projection of a stored repository. The only form in
/// which repositories travel through the per-repository tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRef {
    pub id: i64,
    pub name: String,
}

/// Key handed to a batch write to associate rows with their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Id(i64),
    Name(String),
}

impl Identifier {
    /// Prefer the id, fall back to the name.
    pub fn from_parts(id: Option<i64>, name: Option<&str>) -> Option<Self> {
        match (id, name) {
            (Some(id), _) => Some(Identifier::Id(id)),
            (None, Some(name)) => Some(Identifier::Name(name.to_string())),
            (None, None) => None,
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Id(id) => write!(f, "#{}", id),
            Identifier::Name(name) => f.write_str(name),
        }
    }
}
