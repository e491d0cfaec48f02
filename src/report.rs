//! Run report: per-entity counts plus the timer tree.
//!
//! Counts are gathered concurrently, one `count` query per entity, and put
//! back into [`Entity::ALL`] order before display. Output goes to stdout,
//! either as text or as a single JSON document.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::db;
use crate::harvest::HarvestReport;
use crate::migrate;
use crate::store::sqlite::SqliteStore;
use crate::store::{Entity, Store};
use crate::timer::TimerTree;
use crate::walker::{TaskFailure, WalkSummary};

/// Count every entity type.
pub async fn count_entities(store: Arc<dyn Store>) -> Result<Vec<(Entity, i64)>> {
    let mut set = JoinSet::new();
    for entity in Entity::ALL {
        let store = Arc::clone(&store);
        set.spawn(async move {
            let n = store
                .count(entity)
                .await
                .with_context(|| format!("Failed to count {}", entity.name()))?;
            Ok::<_, anyhow::Error>((entity, n))
        });
    }

    let mut counts = Vec::with_capacity(Entity::ALL.len());
    while let Some(joined) = set.join_next().await {
        counts.push(joined.context("count task panicked")??);
    }
    counts.sort_by_key(|(entity, _)| Entity::ALL.iter().position(|e| e == entity));
    Ok(counts)
}

pub fn render_counts(counts: &[(Entity, i64)]) -> String {
    let mut out = String::from("**Count**\n---\n");
    for (entity, n) in counts {
        let _ = writeln!(out, "{}: {}", entity.name(), n);
    }
    out
}

/// Plain-text report: counts, failures (if any) and timings.
pub fn render_report(report: &HarvestReport) -> String {
    let mut out = render_counts(&report.counts);

    let summary = &report.summary;
    let _ = writeln!(
        out,
        "\norganisations: {}  repositories: {}  tasks: {}  failed: {}  pruned: {}",
        summary.organisations,
        summary.repositories,
        summary.tasks_run,
        summary.failures.len(),
        report.pruned
    );
    for failure in &summary.failures {
        let target = match &failure.repository {
            Some(repo) => format!("{}/{}", failure.org, repo),
            None => failure.org.clone(),
        };
        let _ = writeln!(out, "  {} {}: {}", failure.task, target, failure.reason);
    }

    out.push_str("\n**Time**\n---\n");
    out.push_str(&report.timer.render());
    out
}

#[derive(Serialize)]
struct CountRow {
    entity: &'static str,
    count: i64,
}

fn count_rows(counts: &[(Entity, i64)]) -> Vec<CountRow> {
    counts
        .iter()
        .map(|(entity, count)| CountRow {
            entity: entity.name(),
            count: *count,
        })
        .collect()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    counts: Vec<CountRow>,
    organisations: usize,
    repositories: usize,
    tasks_run: usize,
    pruned: u64,
    failures: &'a [TaskFailure],
    time: &'a TimerTree,
}

pub fn report_json(report: &HarvestReport) -> Result<String> {
    let WalkSummary {
        organisations,
        repositories,
        tasks_run,
        failures,
    } = &report.summary;

    let doc = JsonReport {
        counts: count_rows(&report.counts),
        organisations: *organisations,
        repositories: *repositories,
        tasks_run: *tasks_run,
        pruned: report.pruned,
        failures,
        time: &report.timer,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// `harvest stats`: print the counts of the configured database.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool, false).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let counts = count_entities(store.clone()).await;
    store.close().await;
    let counts = counts?;

    if json {
        println!("{}", serde_json::to_string_pretty(&count_rows(&counts))?);
    } else {
        println!("Database: {}", config.db.path.display());
        println!();
        print!("{}", render_counts(&counts));
    }
    Ok(())
}
