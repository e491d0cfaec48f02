//! Orchestration tests: a scripted `RemoteSource` and the in-memory store
//! drive full harvest runs without any network or database.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use org_harvest::config::ExternalProject;
use org_harvest::harvest::run_harvest;
use org_harvest::models::{
    Collaborator, Commit, CommunityProfile, Contribution, ExternalContribution, Identifier, Issue,
    Member, Organisation, OrganisationSummary, PullRequest, Repository, StoredOrganisation,
    StoredRecord, StoredRepository,
};
use org_harvest::source::RemoteSource;
use org_harvest::store::memory::InMemoryStore;
use org_harvest::store::{Entity, Store};
use org_harvest::timer::TOTAL_TIME;

const TASK_NAMES: [&str; 9] = [
    "OrgDetails",
    "Members",
    "Repos",
    "CommunityProfile",
    "PullRequests",
    "Commits",
    "Collaborators",
    "Contributions",
    "Issues",
];

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}

#[derive(Default)]
struct FakeGithub {
    orgs: Vec<(i64, String)>,
    members: HashMap<String, Vec<Member>>,
    repos: HashMap<String, Vec<Repository>>,
    commits: HashMap<String, Vec<Commit>>,
    external: HashMap<String, Vec<ExternalContribution>>,
    /// `task` or `task:target` entries that fail.
    failing: HashSet<String>,
    fail_listing: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeGithub {
    fn with_orgs(logins: &[&str]) -> Self {
        Self {
            orgs: logins
                .iter()
                .enumerate()
                .map(|(i, login)| (i as i64 + 1, login.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    fn repo(mut self, org: &str, id: i64, name: &str) -> Self {
        self.repos
            .entry(org.to_string())
            .or_default()
            .push(decode(json!({ "id": id, "name": name, "full_name": format!("{}/{}", org, name) })));
        self
    }

    fn member(mut self, org: &str, id: i64, login: &str) -> Self {
        self.members
            .entry(org.to_string())
            .or_default()
            .push(decode(json!({ "id": id, "login": login })));
        self
    }

    fn external(mut self, org: &str, project: &str, logins: &[&str]) -> Self {
        let rows = logins.iter().map(|login| ExternalContribution {
            project_org: org.to_string(),
            project_name: project.to_string(),
            login: login.to_string(),
            contributions: 3,
        });
        self.external
            .entry(format!("{}/{}", org, project))
            .or_default()
            .extend(rows);
        self
    }

    fn fail(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    fn call(&self, task: &str, target: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", task, target));
        if self.failing.contains(task) || self.failing.contains(&format!("{}:{}", task, target)) {
            bail!("scripted failure for {} {}", task, target);
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for FakeGithub {
    async fn organisations(&self) -> Result<Vec<OrganisationSummary>> {
        if self.fail_listing {
            bail!("listing unavailable");
        }
        Ok(self
            .orgs
            .iter()
            .map(|(id, login)| OrganisationSummary {
                id: *id,
                login: login.clone(),
            })
            .collect())
    }

    async fn organisation(&self, org: &str) -> Result<Organisation> {
        self.call("OrgDetails", org)?;
        let (id, login) = self
            .orgs
            .iter()
            .find(|(_, login)| login == org)
            .cloned()
            .unwrap();
        Ok(decode(json!({ "id": id, "login": login, "name": login.to_uppercase() })))
    }

    async fn members(&self, org: &str) -> Result<Vec<Member>> {
        self.call("Members", org)?;
        Ok(self.members.get(org).cloned().unwrap_or_default())
    }

    async fn repositories(&self, org: &str) -> Result<Vec<Repository>> {
        self.call("Repos", org)?;
        Ok(self.repos.get(org).cloned().unwrap_or_default())
    }

    async fn community_profile(&self, org: &str, repo: &str) -> Result<Vec<CommunityProfile>> {
        self.call("CommunityProfile", &format!("{}/{}", org, repo))?;
        Ok(Vec::new())
    }

    async fn pull_requests(&self, org: &str, repo: &str) -> Result<Vec<PullRequest>> {
        self.call("PullRequests", &format!("{}/{}", org, repo))?;
        Ok(Vec::new())
    }

    async fn commits(&self, org: &str, repo: &str) -> Result<Vec<Commit>> {
        let target = format!("{}/{}", org, repo);
        self.call("Commits", &target)?;
        Ok(self.commits.get(&target).cloned().unwrap_or_default())
    }

    async fn collaborators(&self, org: &str, repo: &str) -> Result<Vec<Collaborator>> {
        self.call("Collaborators", &format!("{}/{}", org, repo))?;
        Ok(Vec::new())
    }

    async fn contributions(&self, org: &str, repo: &str) -> Result<Vec<Contribution>> {
        self.call("Contributions", &format!("{}/{}", org, repo))?;
        Ok(Vec::new())
    }

    async fn issues(&self, org: &str) -> Result<Vec<Issue>> {
        self.call("Issues", org)?;
        Ok(Vec::new())
    }

    async fn external_contributions(
        &self,
        org: &str,
        project: &str,
    ) -> Result<Vec<ExternalContribution>> {
        let target = format!("{}/{}", org, project);
        self.call("ExternalContributions", &target)?;
        Ok(self.external.get(&target).cloned().unwrap_or_default())
    }
}

/// Store wrapper that remembers the parent association of every write.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryStore,
    member_handles: Mutex<Vec<StoredOrganisation>>,
    identifiers: Mutex<Vec<(&'static str, Option<Identifier>)>>,
}

impl RecordingStore {
    fn note(&self, what: &'static str, ident: Option<&Identifier>) {
        self.identifiers
            .lock()
            .unwrap()
            .push((what, ident.cloned()));
    }

    fn identifiers_for(&self, what: &str) -> Vec<Option<Identifier>> {
        self.identifiers
            .lock()
            .unwrap()
            .iter()
            .filter(|(w, _)| *w == what)
            .map(|(_, ident)| ident.clone())
            .collect()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn write_organisation(&self, org: &Organisation) -> Result<StoredOrganisation> {
        self.inner.write_organisation(org).await
    }

    async fn write_members(
        &self,
        members: &[Member],
        org: &StoredOrganisation,
    ) -> Result<Vec<StoredRecord>> {
        self.member_handles.lock().unwrap().push(org.clone());
        self.inner.write_members(members, org).await
    }

    async fn write_repositories(
        &self,
        repos: &[Repository],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRepository>> {
        self.note("repositories", org);
        self.inner.write_repositories(repos, org).await
    }

    async fn write_community_profiles(
        &self,
        profiles: &[CommunityProfile],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("community_profiles", repo);
        self.inner.write_community_profiles(profiles, repo).await
    }

    async fn write_pull_requests(
        &self,
        pulls: &[PullRequest],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("pull_requests", repo);
        self.inner.write_pull_requests(pulls, repo).await
    }

    async fn write_commits(
        &self,
        commits: &[Commit],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("commits", repo);
        self.inner.write_commits(commits, repo).await
    }

    async fn write_collaborators(
        &self,
        collaborators: &[Collaborator],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("collaborators", repo);
        self.inner.write_collaborators(collaborators, repo).await
    }

    async fn write_contributions(
        &self,
        contributions: &[Contribution],
        repo: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("contributions", repo);
        self.inner.write_contributions(contributions, repo).await
    }

    async fn write_issues(
        &self,
        issues: &[Issue],
        org: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("issues", org);
        self.inner.write_issues(issues, org).await
    }

    async fn write_external_contributions(
        &self,
        contributions: &[ExternalContribution],
        parent: Option<&Identifier>,
    ) -> Result<Vec<StoredRecord>> {
        self.note("external_contributions", parent);
        self.inner
            .write_external_contributions(contributions, parent)
            .await
    }

    async fn delete_stray_external_contributions(&self) -> Result<u64> {
        self.inner.delete_stray_external_contributions().await
    }

    async fn count(&self, entity: Entity) -> Result<i64> {
        self.inner.count(entity).await
    }
}

fn count_of(counts: &[(Entity, i64)], entity: Entity) -> i64 {
    counts
        .iter()
        .find(|(e, _)| *e == entity)
        .map(|(_, n)| *n)
        .unwrap()
}

#[tokio::test]
async fn two_organisations_with_one_empty_repository_each() {
    let source = FakeGithub::with_orgs(&["acme", "globex"])
        .repo("acme", 10, "anvil")
        .repo("globex", 20, "reactor");
    let store = Arc::new(InMemoryStore::new());

    let report = run_harvest(&source, store.clone(), &[]).await.unwrap();

    assert_eq!(count_of(&report.counts, Entity::Organisation), 2);
    assert_eq!(count_of(&report.counts, Entity::Repository), 2);
    for entity in [
        Entity::Issue,
        Entity::Member,
        Entity::PullRequest,
        Entity::Commit,
        Entity::CommunityProfile,
        Entity::ExternalContribution,
        Entity::Collaborator,
        Entity::Contribution,
    ] {
        assert_eq!(count_of(&report.counts, entity), 0, "{:?}", entity);
    }

    let mut task_total = 0.0;
    for login in ["acme", "globex"] {
        let entry = report.timer.org(login).unwrap();
        assert!(entry.scalar(TOTAL_TIME).unwrap() >= 0.0);
        let tasks = report.timer.org_tasks(login).unwrap();
        assert_eq!(tasks.len(), TASK_NAMES.len());
        for (name, _) in tasks.iter() {
            assert!(TASK_NAMES.iter().any(|t| *t == name), "unexpected task key {}", name);
        }
        task_total += tasks
            .iter()
            .map(|(_, node)| match node {
                org_harvest::timer::TimerNode::Scalar(ms) => *ms,
                org_harvest::timer::TimerNode::Node(_) => 0.0,
            })
            .sum::<f64>();
    }
    assert!(report.timer.total_ms() >= task_total);
    assert!(report.timer.external().is_none());

    let owners: Vec<Option<String>> = store
        .repositories()
        .unwrap()
        .into_iter()
        .map(|r| r.organisation)
        .collect();
    assert_eq!(
        owners,
        vec![Some("acme".to_string()), Some("globex".to_string())]
    );

    assert_eq!(report.summary.organisations, 2);
    assert_eq!(report.summary.repositories, 2);
    assert_eq!(report.summary.tasks_run, 2 * TASK_NAMES.len());
    assert!(report.summary.failures.is_empty());
}

#[tokio::test]
async fn tasks_run_in_walk_order() {
    let source = FakeGithub::with_orgs(&["acme"]).repo("acme", 10, "anvil");
    let store = Arc::new(InMemoryStore::new());

    run_harvest(&source, store, &[]).await.unwrap();

    assert_eq!(
        source.calls(),
        vec![
            "OrgDetails:acme",
            "Members:acme",
            "Repos:acme",
            "CommunityProfile:acme/anvil",
            "PullRequests:acme/anvil",
            "Commits:acme/anvil",
            "Collaborators:acme/anvil",
            "Contributions:acme/anvil",
            "Issues:acme",
        ]
    );
}

#[tokio::test]
async fn failed_commits_do_not_stop_the_repository() {
    let source = FakeGithub::with_orgs(&["acme"])
        .repo("acme", 10, "anvil")
        .repo("acme", 11, "rocket")
        .fail("Commits:acme/anvil");
    let store = Arc::new(InMemoryStore::new());

    let report = run_harvest(&source, store, &[]).await.unwrap();

    let calls = source.calls();
    let commits = calls
        .iter()
        .position(|c| c == "Commits:acme/anvil")
        .unwrap();
    assert_eq!(calls[commits + 1], "Collaborators:acme/anvil");
    assert!(calls.contains(&"Commits:acme/rocket".to_string()));
    assert!(calls.contains(&"Issues:acme".to_string()));

    let failures = &report.summary.failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task, "Commits");
    assert_eq!(failures[0].repository.as_deref(), Some("anvil"));
    assert!(failures[0].reason.contains("scripted failure"));

    // the failed attempt is timed like any other
    let tasks = report.timer.org_tasks("acme").unwrap();
    assert!(tasks.scalar("Commits").is_some());
}

#[tokio::test]
async fn members_without_organisation_handle_fail_but_are_timed() {
    let source = FakeGithub::with_orgs(&["acme"])
        .member("acme", 1, "alice")
        .fail("OrgDetails");
    let store = Arc::new(InMemoryStore::new());

    let report = run_harvest(&source, store.clone(), &[]).await.unwrap();

    assert!(source.calls().contains(&"Members:acme".to_string()));
    let tasks: Vec<&str> = report.summary.failures.iter().map(|f| f.task).collect();
    assert_eq!(tasks, vec!["OrgDetails", "Members"]);
    assert!(report.summary.failures[1]
        .reason
        .contains("no stored organisation"));

    let timed = report.timer.org_tasks("acme").unwrap();
    assert!(timed.scalar("OrgDetails").is_some());
    assert!(timed.scalar("Members").is_some());
    assert!(timed.scalar("Issues").is_some());
    assert_eq!(count_of(&report.counts, Entity::Member), 0);
}

#[tokio::test]
async fn failed_repository_listing_means_no_repositories() {
    let source = FakeGithub::with_orgs(&["acme"])
        .repo("acme", 10, "anvil")
        .fail("Repos");
    let store = Arc::new(InMemoryStore::new());

    let report = run_harvest(&source, store, &[]).await.unwrap();

    assert!(!source.calls().iter().any(|c| c.contains("anvil")));
    assert_eq!(report.summary.repositories, 0);
    assert!(report
        .timer
        .org_tasks("acme")
        .unwrap()
        .scalar("Issues")
        .is_some());
}

#[tokio::test]
async fn persists_receive_identifiers_and_members_the_handle() {
    let source = FakeGithub::with_orgs(&["acme"])
        .repo("acme", 10, "anvil")
        .member("acme", 1, "alice")
        .external("rust-lang", "rust", &["alice"]);
    let store = Arc::new(RecordingStore::default());
    let projects = vec![ExternalProject::new("rust-lang", "rust")];

    run_harvest(&source, store.clone(), &projects).await.unwrap();

    let handles = store.member_handles.lock().unwrap().clone();
    assert_eq!(
        handles,
        vec![StoredOrganisation {
            id: 1,
            login: "acme".to_string(),
            name: Some("ACME".to_string()),
        }]
    );

    assert_eq!(
        store.identifiers_for("repositories"),
        vec![Some(Identifier::Name("acme".to_string()))]
    );
    assert_eq!(
        store.identifiers_for("issues"),
        vec![Some(Identifier::Name("acme".to_string()))]
    );
    for table in [
        "community_profiles",
        "pull_requests",
        "commits",
        "collaborators",
        "contributions",
    ] {
        assert_eq!(
            store.identifiers_for(table),
            vec![Some(Identifier::Id(10))],
            "{}",
            table
        );
    }
    assert_eq!(store.identifiers_for("external_contributions"), vec![None]);
}

#[tokio::test]
async fn pruning_runs_after_every_organisation() {
    // bob only becomes a known member with the second organisation
    let source = FakeGithub::with_orgs(&["acme", "globex"])
        .member("acme", 1, "alice")
        .member("globex", 2, "bob")
        .external("rust-lang", "rust", &["alice", "bob", "mallory"]);
    let store = Arc::new(InMemoryStore::new());
    let projects = vec![ExternalProject::new("rust-lang", "rust")];

    let report = run_harvest(&source, store.clone(), &projects)
        .await
        .unwrap();

    assert_eq!(report.pruned, 1);
    let mut remaining: Vec<String> = store
        .external_contributions()
        .unwrap()
        .into_iter()
        .map(|c| c.login)
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["alice", "bob"]);
    assert_eq!(count_of(&report.counts, Entity::ExternalContribution), 2);

    let external = report.timer.external().unwrap();
    assert!(external.scalar("rust-lang").is_some());
    assert!(report.timer.org("rust-lang").is_none());
}

#[tokio::test]
async fn failed_external_pass_still_walks_and_prunes() {
    let source = FakeGithub::with_orgs(&["acme"])
        .member("acme", 1, "alice")
        .fail("ExternalContributions:rust-lang/rust");
    let store = Arc::new(InMemoryStore::new());
    // left over from an earlier run; mallory belongs to no organisation
    store
        .write_external_contributions(
            &[ExternalContribution {
                project_org: "rust-lang".to_string(),
                project_name: "rust".to_string(),
                login: "mallory".to_string(),
                contributions: 40,
            }],
            None,
        )
        .await
        .unwrap();
    let projects = vec![ExternalProject::new("rust-lang", "rust")];

    let report = run_harvest(&source, store.clone(), &projects)
        .await
        .unwrap();

    let external = report.timer.external().unwrap();
    assert!(external.scalar("rust-lang").unwrap() >= 0.0);

    assert_eq!(report.summary.failures.len(), 1);
    let failure = &report.summary.failures[0];
    assert_eq!(failure.task, "ExternalContributions");
    assert_eq!(failure.org, "rust-lang");
    assert_eq!(failure.repository.as_deref(), Some("rust"));

    assert!(source.calls().iter().any(|c| c == "OrgDetails:acme"));
    assert!(source.calls().iter().any(|c| c == "Issues:acme"));
    assert!(report.timer.org_tasks("acme").unwrap().scalar("Issues").is_some());

    assert_eq!(report.pruned, 1);
    assert!(store.external_contributions().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_runs_do_not_duplicate_rows() {
    let source = FakeGithub::with_orgs(&["acme"])
        .repo("acme", 10, "anvil")
        .member("acme", 1, "alice")
        .external("rust-lang", "rust", &["alice"])
        .external("tokio-rs", "tokio", &["alice"]);
    let store = Arc::new(InMemoryStore::new());
    let projects = vec![
        ExternalProject::new("rust-lang", "rust"),
        ExternalProject::new("tokio-rs", "tokio"),
    ];

    let first = run_harvest(&source, store.clone(), &projects)
        .await
        .unwrap();
    let second = run_harvest(&source, store.clone(), &projects)
        .await
        .unwrap();

    assert_eq!(first.counts, second.counts);
    assert_eq!(count_of(&second.counts, Entity::ExternalContribution), 2);
    assert_eq!(store.member_logins(1).unwrap(), vec!["alice"]);
}

#[tokio::test]
async fn failed_organisation_listing_yields_no_report() {
    let mut source = FakeGithub::with_orgs(&["acme"]).external("rust-lang", "rust", &["alice"]);
    source.fail_listing = true;
    let store = Arc::new(InMemoryStore::new());
    let projects = vec![ExternalProject::new("rust-lang", "rust")];

    assert!(run_harvest(&source, store.clone(), &projects).await.is_none());

    // the external pass already ran and nothing reconciles it
    assert_eq!(store.external_contributions().unwrap().len(), 1);
    assert!(!source.calls().iter().any(|c| c.starts_with("OrgDetails")));
}

#[tokio::test]
async fn commits_are_stored_per_repository() {
    let mut source = FakeGithub::with_orgs(&["acme"])
        .repo("acme", 10, "anvil")
        .repo("acme", 11, "rocket");
    let commit: Commit = decode(json!({
        "sha": "abc123",
        "commit": { "message": "init", "author": { "name": "Alice", "email": "a@acme.test" } },
        "author": { "id": 1, "login": "alice" }
    }));
    source
        .commits
        .insert("acme/anvil".to_string(), vec![commit.clone()]);
    source
        .commits
        .insert("acme/rocket".to_string(), vec![commit]);
    let store = Arc::new(InMemoryStore::new());

    let report = run_harvest(&source, store, &[]).await.unwrap();

    // same sha in two repositories is two rows
    assert_eq!(count_of(&report.counts, Entity::Commit), 2);
}
