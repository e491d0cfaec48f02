//! Task descriptor table.
//!
//! Every fetch-then-persist unit the harvester knows about is a
//! [`ResourceKind`]. [`TASKS`] lists them in execution order together with
//! the [`Phase`] of the walk they belong to; fetch and persist dispatch is an
//! exhaustive `match` in [`runner`](crate::runner), so adding a kind without
//! wiring it up does not compile.

use crate::config::ExternalProject;
use crate::models::{Identifier, RepositoryRef, StoredOrganisation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    OrgDetails,
    Members,
    Repos,
    CommunityProfile,
    PullRequests,
    Commits,
    Collaborators,
    Contributions,
    Issues,
    ExternalContributions,
}

impl ResourceKind {
    /// Key used in the timer tree and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::OrgDetails => "OrgDetails",
            ResourceKind::Members => "Members",
            ResourceKind::Repos => "Repos",
            ResourceKind::CommunityProfile => "CommunityProfile",
            ResourceKind::PullRequests => "PullRequests",
            ResourceKind::Commits => "Commits",
            ResourceKind::Collaborators => "Collaborators",
            ResourceKind::Contributions => "Contributions",
            ResourceKind::Issues => "Issues",
            ResourceKind::ExternalContributions => "ExternalContributions",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where in the walk a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Once per run, before any organisation.
    External,
    /// Per organisation, before its repositories. Outputs feed later tasks.
    BeforeRepositories,
    /// Per repository of an organisation.
    PerRepository,
    /// Per organisation, after its repositories.
    AfterRepositories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub kind: ResourceKind,
    pub phase: Phase,
}

impl TaskDescriptor {
    pub fn applies_per_repository(&self) -> bool {
        self.phase == Phase::PerRepository
    }
}

pub static TASKS: [TaskDescriptor; 10] = [
    TaskDescriptor {
        kind: ResourceKind::ExternalContributions,
        phase: Phase::External,
    },
    TaskDescriptor {
        kind: ResourceKind::OrgDetails,
        phase: Phase::BeforeRepositories,
    },
    TaskDescriptor {
        kind: ResourceKind::Members,
        phase: Phase::BeforeRepositories,
    },
    TaskDescriptor {
        kind: ResourceKind::Repos,
        phase: Phase::BeforeRepositories,
    },
    TaskDescriptor {
        kind: ResourceKind::CommunityProfile,
        phase: Phase::PerRepository,
    },
    TaskDescriptor {
        kind: ResourceKind::PullRequests,
        phase: Phase::PerRepository,
    },
    TaskDescriptor {
        kind: ResourceKind::Commits,
        phase: Phase::PerRepository,
    },
    TaskDescriptor {
        kind: ResourceKind::Collaborators,
        phase: Phase::PerRepository,
    },
    TaskDescriptor {
        kind: ResourceKind::Contributions,
        phase: Phase::PerRepository,
    },
    TaskDescriptor {
        kind: ResourceKind::Issues,
        phase: Phase::AfterRepositories,
    },
];

/// Kinds belonging to `phase`, in table order.
pub fn tasks_in(phase: Phase) -> impl Iterator<Item = ResourceKind> {
    TASKS
        .iter()
        .filter(move |t| t.phase == phase)
        .map(|t| t.kind)
}

/// Scope parameter of a task: what the fetch is narrowed to and what the
/// persisted rows are associated with.
#[derive(Debug, Clone, Copy)]
pub enum TaskParam<'a> {
    /// Organisation-scoped task; rows keyed by the login.
    Organisation(&'a str),
    /// Members task; the store receives the whole handle. `None` when the
    /// organisation details could not be stored.
    StoredOrganisation(Option<&'a StoredOrganisation>),
    Repository(&'a RepositoryRef),
    Project(&'a ExternalProject),
}

impl<'a> TaskParam<'a> {
    /// Name forwarded to the fetch (repository or project name).
    pub fn name_hint(&self) -> Option<&'a str> {
        match *self {
            TaskParam::Organisation(_) | TaskParam::StoredOrganisation(_) => None,
            TaskParam::Repository(repo) => Some(repo.name.as_str()),
            TaskParam::Project(project) => Some(project.name.as_str()),
        }
    }

    /// Identifier handed to the persist call: the id when there is one,
    /// otherwise the name. External projects persist without a parent.
    pub fn identifier(&self) -> Option<Identifier> {
        match *self {
            TaskParam::Organisation(login) => Identifier::from_parts(None, Some(login)),
            TaskParam::StoredOrganisation(handle) => {
                handle.and_then(|h| Identifier::from_parts(Some(h.id), Some(&h.login)))
            }
            TaskParam::Repository(repo) => Identifier::from_parts(Some(repo.id), Some(&repo.name)),
            TaskParam::Project(_) => None,
        }
    }
}
