//! Nested timing report for a harvest run.
//!
//! Shape of a finished tree:
//!
//! ```text
//! totalTime: <ms>
//! external contributions
//!   <project org>: <ms>
//! <org login>
//!   totalTime: <ms>
//!   tasks
//!     OrgDetails: <ms>
//!     Members: <ms>
//!     ...
//! ```
//!
//! Only the task runner writes task entries, through
//! [`TimerTree::record_task`]. A task whose scope has no registered
//! organisation lands in the `external contributions` bucket.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

pub const TOTAL_TIME: &str = "totalTime";
pub const TASKS: &str = "tasks";
pub const EXTERNAL_BUCKET: &str = "external contributions";

/// A timer entry: a duration in milliseconds or a nested mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerNode {
    Scalar(f64),
    Node(TimerMap),
}

/// Insertion-ordered name → [`TimerNode`] mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimerMap {
    entries: Vec<(String, TimerNode)>,
}

impl TimerMap {
    pub fn get(&self, key: &str) -> Option<&TimerNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut TimerNode> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Replace the entry for `key`, keeping its position, or append it.
    pub fn set(&mut self, key: &str, node: TimerNode) {
        match self.get_mut(key) {
            Some(existing) => *existing = node,
            None => self.entries.push((key.to_string(), node)),
        }
    }

    pub fn scalar(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(TimerNode::Scalar(ms)) => Some(*ms),
            _ => None,
        }
    }

    pub fn node(&self, key: &str) -> Option<&TimerMap> {
        match self.get(key) {
            Some(TimerNode::Node(map)) => Some(map),
            _ => None,
        }
    }

    fn node_mut(&mut self, key: &str) -> Option<&mut TimerMap> {
        match self.get_mut(key) {
            Some(TimerNode::Node(map)) => Some(map),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TimerNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TimerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl Serialize for TimerNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimerNode::Scalar(ms) => serializer.serialize_f64(*ms),
            TimerNode::Node(map) => map.serialize(serializer),
        }
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

/// Timing context owned by the harvest coordinator for one run.
///
/// The run total, the external bucket and the organisation entries are kept
/// apart so an organisation login can never collide with a root key. They
/// are only laid side by side when rendered or serialized.
#[derive(Debug)]
pub struct TimerTree {
    started: Instant,
    total: f64,
    external: Option<TimerMap>,
    orgs: TimerMap,
    open_orgs: HashMap<String, Instant>,
}

impl Default for TimerTree {
    fn default() -> Self {
        Self::start()
    }
}

impl TimerTree {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            total: 0.0,
            external: None,
            orgs: TimerMap::default(),
            open_orgs: HashMap::new(),
        }
    }

    /// Register an organisation entry with an empty task mapping.
    pub fn open_org(&mut self, login: &str) {
        let mut entry = TimerMap::default();
        entry.set(TOTAL_TIME, TimerNode::Scalar(0.0));
        entry.set(TASKS, TimerNode::Node(TimerMap::default()));
        self.orgs.set(login, TimerNode::Node(entry));
        self.open_orgs.insert(login.to_string(), Instant::now());
    }

    /// Overwrite the organisation's `totalTime` with the time since
    /// [`open_org`](Self::open_org).
    pub fn close_org(&mut self, login: &str) {
        let Some(opened) = self.open_orgs.remove(login) else {
            return;
        };
        if let Some(entry) = self.orgs.node_mut(login) {
            entry.set(TOTAL_TIME, TimerNode::Scalar(millis(opened.elapsed())));
        }
    }

    pub fn is_registered(&self, scope: &str) -> bool {
        self.org(scope).is_some()
    }

    /// Attribute a finished task's duration to its scope.
    ///
    /// Registered organisations get `tasks[task] = ms`. Anything else is
    /// summed per scope under the `external contributions` bucket.
    pub fn record_task(&mut self, scope: &str, task: &str, elapsed: Duration) {
        let ms = millis(elapsed);

        if let Some(tasks) = self
            .orgs
            .node_mut(scope)
            .and_then(|entry| entry.node_mut(TASKS))
        {
            tasks.set(task, TimerNode::Scalar(ms));
            return;
        }

        let bucket = self.external.get_or_insert_with(TimerMap::default);
        let previous = bucket.scalar(scope).unwrap_or(0.0);
        bucket.set(scope, TimerNode::Scalar(previous + ms));
    }

    /// Set the root `totalTime` to the elapsed time of the whole run.
    pub fn finish(&mut self) {
        self.total = millis(self.started.elapsed());
    }

    pub fn total_ms(&self) -> f64 {
        self.total
    }

    pub fn org(&self, login: &str) -> Option<&TimerMap> {
        self.orgs.node(login).filter(|e| e.node(TASKS).is_some())
    }

    pub fn org_tasks(&self, login: &str) -> Option<&TimerMap> {
        self.org(login).and_then(|e| e.node(TASKS))
    }

    /// Organisation entries in the order they were opened.
    pub fn orgs(&self) -> &TimerMap {
        &self.orgs
    }

    pub fn external(&self) -> Option<&TimerMap> {
        self.external.as_ref()
    }

    /// Root entries in report order: run total, external bucket, then one
    /// entry per organisation.
    fn sections(&self) -> impl Iterator<Item = (&str, TimerNodeRef<'_>)> {
        let total = std::iter::once((TOTAL_TIME, TimerNodeRef::Scalar(self.total)));
        let external = self
            .external
            .iter()
            .map(|bucket| (EXTERNAL_BUCKET, TimerNodeRef::Node(bucket)));
        let orgs = self.orgs.iter().map(|(login, node)| {
            let node = match node {
                TimerNode::Scalar(ms) => TimerNodeRef::Scalar(*ms),
                TimerNode::Node(map) => TimerNodeRef::Node(map),
            };
            (login, node)
        });
        total.chain(external).chain(orgs)
    }

    /// Indented plain-text rendering of the whole tree.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, node) in self.sections() {
            match node {
                TimerNodeRef::Scalar(ms) => {
                    let _ = writeln!(out, "{}: {:.2} ms", key, ms);
                }
                TimerNodeRef::Node(child) => {
                    let _ = writeln!(out, "{}", key);
                    render_map(child, 1, &mut out);
                }
            }
        }
        out
    }
}

enum TimerNodeRef<'a> {
    Scalar(f64),
    Node(&'a TimerMap),
}

impl Serialize for TimerTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, node) in self.sections() {
            match node {
                TimerNodeRef::Scalar(ms) => map.serialize_entry(key, &ms)?,
                TimerNodeRef::Node(child) => map.serialize_entry(key, child)?,
            }
        }
        map.end()
    }
}

fn render_map(map: &TimerMap, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for (key, node) in map.iter() {
        match node {
            TimerNode::Scalar(ms) => {
                let _ = writeln!(out, "{}{}: {:.2} ms", indent, key, ms);
            }
            TimerNode::Node(child) => {
                let _ = writeln!(out, "{}{}", indent, key);
                render_map(child, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_org_gets_task_entry() {
        let mut timer = TimerTree::start();
        timer.open_org("acme");
        timer.record_task("acme", "Repos", Duration::from_millis(5));

        let tasks = timer.org_tasks("acme").unwrap();
        assert_eq!(tasks.scalar("Repos"), Some(5.0));
        assert!(timer.external().is_none());
    }

    #[test]
    fn unregistered_scope_goes_to_external_bucket() {
        let mut timer = TimerTree::start();
        timer.record_task("rust-lang", "ExternalContributions", Duration::from_millis(2));
        timer.record_task("rust-lang", "ExternalContributions", Duration::from_millis(3));
        timer.record_task("tokio-rs", "ExternalContributions", Duration::from_millis(1));

        let bucket = timer.external().unwrap();
        assert_eq!(bucket.scalar("rust-lang"), Some(5.0));
        assert_eq!(bucket.scalar("tokio-rs"), Some(1.0));
        assert!(timer.org("rust-lang").is_none());
    }

    #[test]
    fn rerecording_a_task_overwrites_in_place() {
        let mut timer = TimerTree::start();
        timer.open_org("acme");
        timer.record_task("acme", "Commits", Duration::from_millis(1));
        timer.record_task("acme", "Issues", Duration::from_millis(1));
        timer.record_task("acme", "Commits", Duration::from_millis(9));

        let tasks = timer.org_tasks("acme").unwrap();
        assert_eq!(tasks.keys().collect::<Vec<_>>(), vec!["Commits", "Issues"]);
        assert_eq!(tasks.scalar("Commits"), Some(9.0));
    }

    #[test]
    fn close_org_sets_non_negative_total() {
        let mut timer = TimerTree::start();
        timer.open_org("acme");
        timer.close_org("acme");
        let total = timer.org("acme").unwrap().scalar(TOTAL_TIME).unwrap();
        assert!(total >= 0.0);

        // closing twice is a no-op
        timer.close_org("acme");
        assert_eq!(timer.org("acme").unwrap().scalar(TOTAL_TIME), Some(total));
    }

    #[test]
    fn render_nests_by_indentation() {
        let mut timer = TimerTree::start();
        timer.open_org("acme");
        timer.record_task("acme", "Members", Duration::from_millis(4));

        let text = timer.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "totalTime: 0.00 ms");
        assert_eq!(lines[1], "acme");
        assert_eq!(lines[2], "  totalTime: 0.00 ms");
        assert_eq!(lines[3], "  tasks");
        assert_eq!(lines[4], "    Members: 4.00 ms");
    }

    #[test]
    fn serializes_as_nested_json_objects() {
        let mut timer = TimerTree::start();
        timer.open_org("acme");
        timer.record_task("acme", "Issues", Duration::from_millis(8));

        let json = serde_json::to_value(&timer).unwrap();
        assert_eq!(json["acme"]["tasks"]["Issues"], serde_json::json!(8.0));
        assert!(json["totalTime"].is_number());
    }

    #[test]
    fn org_named_like_a_root_key_keeps_its_entry() {
        let mut timer = TimerTree::start();
        timer.open_org(TOTAL_TIME);
        timer.record_task(TOTAL_TIME, "Repos", Duration::from_millis(5));
        timer.close_org(TOTAL_TIME);
        timer.finish();

        let tasks = timer.org_tasks(TOTAL_TIME).unwrap();
        assert_eq!(tasks.scalar("Repos"), Some(5.0));
        assert!(timer.org(TOTAL_TIME).unwrap().scalar(TOTAL_TIME).is_some());
        assert!(timer.total_ms() >= 0.0);
        assert!(timer.external().is_none());

        let text = timer.render();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("totalTime: "));
        assert_eq!(lines[1], "totalTime");
        assert_eq!(lines[3], "  tasks");
        assert_eq!(lines[4], "    Repos: 5.00 ms");
    }
}
