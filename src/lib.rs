//! # org-harvest
//!
//! Harvests the data of every GitHub organisation an access token can see
//! into a local SQLite database: organisation details, members,
//! repositories and, per repository, community profile, pull requests,
//! commits, collaborators and contributors, plus organisation-wide issues
//! and contributors of configured external projects.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ RemoteSource │──▶│  TaskRunner  │──▶│  Store   │
//! │ (GitHub API) │   │ fetch+persist│   │ (SQLite) │
//! └──────────────┘   └──────┬───────┘   └──────────┘
//!                           │ timing
//!                           ▼
//!                     ┌───────────┐
//!                     │ TimerTree │──▶ report
//!                     └───────────┘
//! ```
//!
//! The [`harvest`] coordinator drives the [`walker`], which issues one
//! [`runner`] call per task from the [`tasks`] table.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | API payloads and stored handles |
//! | [`source`] | Remote fetch contract |
//! | [`github`] | GitHub REST client |
//! | [`store`] | Persistence contract, SQLite and in-memory backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`timer`] | Nested timing tree |
//! | [`tasks`] | Task descriptor table |
//! | [`runner`] | Fetch-then-persist unit |
//! | [`walker`] | Organisation and repository walks |
//! | [`harvest`] | Run coordinator |
//! | [`report`] | Counts and report rendering |

pub mod config;
pub mod db;
pub mod github;
pub mod harvest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod report;
pub mod runner;
pub mod source;
pub mod store;
pub mod tasks;
pub mod timer;
pub mod walker;
