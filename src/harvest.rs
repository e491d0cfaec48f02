//! Harvest coordinator.
//!
//! A run is: schema check → external-contribution pass → organisation
//! listing → organisation walk → stray-contribution pruning → report.
//! Task failures are absorbed by the runner; anything that escapes the
//! coordinator's own steps is logged and ends the run without a report.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::{Config, ExternalProject};
use crate::db;
use crate::github::GithubClient;
use crate::migrate;
use crate::report::count_entities;
use crate::runner::TaskRunner;
use crate::source::RemoteSource;
use crate::store::sqlite::SqliteStore;
use crate::store::{Entity, Store};
use crate::tasks::{tasks_in, Phase, TaskParam};
use crate::timer::TimerTree;
use crate::walker::{walk_organisations, WalkSummary};

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Everything a finished run reports.
#[derive(Debug)]
pub struct HarvestReport {
    /// Stored rows per entity, in [`Entity::ALL`] order.
    pub counts: Vec<(Entity, i64)>,
    pub timer: TimerTree,
    pub summary: WalkSummary,
    /// External contributions removed by the pruning step.
    pub pruned: u64,
}

/// Pick the access token: the explicit argument first, then
/// `GITHUB_TOKEN`.
pub fn resolve_token(arg: Option<String>) -> Result<String> {
    choose_token(arg, std::env::var(TOKEN_ENV).ok())
}

fn choose_token(arg: Option<String>, env: Option<String>) -> Result<String> {
    arg.into_iter()
        .chain(env)
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
        .with_context(|| {
            format!(
                "no GitHub access token: pass TOKEN or set {} in the environment",
                TOKEN_ENV
            )
        })
}

/// Open the configured database, make sure the schema exists and harvest
/// everything the token can see.
///
/// Database and client setup errors are returned; failures during the run
/// itself are logged and yield `Ok(None)`.
pub async fn run(config: &Config, token: &str, reset: bool) -> Result<Option<HarvestReport>> {
    // The client must exist before the schema step may drop anything.
    let client = GithubClient::new(&config.github, token)?;
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool, reset).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let report = run_harvest(&client, store.clone(), &config.external_projects).await;

    store.close().await;
    Ok(report)
}

/// Run one harvest against arbitrary source and store implementations.
pub async fn run_harvest(
    source: &dyn RemoteSource,
    store: Arc<dyn Store>,
    projects: &[ExternalProject],
) -> Option<HarvestReport> {
    match harvest(source, store, projects).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %format!("{:#}", e), "harvest aborted");
            None
        }
    }
}

async fn harvest(
    source: &dyn RemoteSource,
    store: Arc<dyn Store>,
    projects: &[ExternalProject],
) -> Result<HarvestReport> {
    let mut timer = TimerTree::start();
    let runner = TaskRunner::new(source, store.as_ref());

    let mut external = WalkSummary::default();
    for project in projects {
        for kind in tasks_in(Phase::External) {
            let outcome = runner
                .run(&mut timer, kind, &project.org, TaskParam::Project(project))
                .await;
            external.note(&project.org, kind, Some(project.name.as_str()), &outcome);
        }
    }

    let organisations = source
        .organisations()
        .await
        .context("Failed to list organisations")?;
    info!(count = organisations.len(), "organisations to harvest");

    let mut summary = walk_organisations(&runner, &mut timer, &organisations).await;
    summary.absorb(external);

    // Must run after every organisation's members are stored, or authors of
    // organisations later in the listing would be pruned.
    let pruned = store
        .delete_stray_external_contributions()
        .await
        .context("Failed to prune external contributions")?;
    info!(pruned, "pruned external contributions from non-members");

    timer.finish();
    let counts = count_entities(store).await?;

    Ok(HarvestReport {
        counts,
        timer,
        summary,
        pruned,
    })
}
