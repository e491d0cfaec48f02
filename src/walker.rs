//! Organisation walker and repository sub-walker.
//!
//! Per organisation: `OrgDetails → Members → Repos → (per repository tasks)*
//! → Issues`. Everything runs strictly in sequence; a failed task is noted
//! in the [`WalkSummary`] and the walk moves on.

use std::time::Instant;

use tracing::info;

use crate::models::{OrganisationSummary, RepositoryRef};
use crate::runner::{TaskOutcome, TaskRunner};
use crate::tasks::{tasks_in, Phase, ResourceKind, TaskParam};
use crate::timer::TimerTree;

/// A task that ended in [`TaskOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TaskFailure {
    pub org: String,
    pub task: &'static str,
    pub repository: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct WalkSummary {
    pub organisations: usize,
    pub repositories: usize,
    pub tasks_run: usize,
    pub failures: Vec<TaskFailure>,
}

impl WalkSummary {
    /// Count a finished task and keep its reason if it failed.
    pub fn note(
        &mut self,
        org: &str,
        kind: ResourceKind,
        repo: Option<&str>,
        outcome: &TaskOutcome,
    ) {
        self.tasks_run += 1;
        if let Some(reason) = outcome.failure() {
            self.failures.push(TaskFailure {
                org: org.to_string(),
                task: kind.name(),
                repository: repo.map(str::to_string),
                reason: reason.to_string(),
            });
        }
    }

    /// Fold the tallies of an earlier pass in; its failures come first.
    pub fn absorb(&mut self, mut earlier: WalkSummary) {
        self.organisations += earlier.organisations;
        self.repositories += earlier.repositories;
        self.tasks_run += earlier.tasks_run;
        earlier.failures.append(&mut self.failures);
        self.failures = earlier.failures;
    }
}

/// Walk every organisation in listing order.
pub async fn walk_organisations(
    runner: &TaskRunner<'_>,
    timer: &mut TimerTree,
    organisations: &[OrganisationSummary],
) -> WalkSummary {
    let mut summary = WalkSummary::default();
    for org in organisations {
        walk_organisation(runner, timer, &org.login, &mut summary).await;
    }
    summary
}

async fn walk_organisation(
    runner: &TaskRunner<'_>,
    timer: &mut TimerTree,
    login: &str,
    summary: &mut WalkSummary,
) {
    info!(org = login, "harvesting organisation");
    let started = Instant::now();
    timer.open_org(login);

    let details = runner
        .run(
            timer,
            ResourceKind::OrgDetails,
            login,
            TaskParam::Organisation(login),
        )
        .await;
    summary.note(login, ResourceKind::OrgDetails, None, &details);
    let handle = details.into_organisation();

    let members = runner
        .run(
            timer,
            ResourceKind::Members,
            login,
            TaskParam::StoredOrganisation(handle.as_ref()),
        )
        .await;
    summary.note(login, ResourceKind::Members, None, &members);

    let repos = runner
        .run(timer, ResourceKind::Repos, login, TaskParam::Organisation(login))
        .await;
    summary.note(login, ResourceKind::Repos, None, &repos);
    // Only {id, name} survives past this point.
    let repositories: Vec<RepositoryRef> = repos
        .into_repositories()
        .into_iter()
        .map(|stored| stored.trim())
        .collect();

    for_each_repository(runner, timer, login, &repositories, summary).await;

    for kind in tasks_in(Phase::AfterRepositories) {
        let outcome = runner
            .run(timer, kind, login, TaskParam::Organisation(login))
            .await;
        summary.note(login, kind, None, &outcome);
    }

    timer.close_org(login);
    summary.organisations += 1;
    info!(
        org = login,
        repositories = repositories.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "organisation done"
    );
}

/// Run the per-repository tasks, in table order, for each repository.
pub async fn for_each_repository(
    runner: &TaskRunner<'_>,
    timer: &mut TimerTree,
    login: &str,
    repositories: &[RepositoryRef],
    summary: &mut WalkSummary,
) {
    for repo in repositories {
        for kind in tasks_in(Phase::PerRepository) {
            let outcome = runner
                .run(timer, kind, login, TaskParam::Repository(repo))
                .await;
            summary.note(login, kind, Some(repo.name.as_str()), &outcome);
        }
        summary.repositories += 1;
    }
}
