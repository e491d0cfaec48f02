use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::store::Entity;

const DROP_ORDER: [Entity; 10] = [
    Entity::Member,
    Entity::CommunityProfile,
    Entity::PullRequest,
    Entity::Commit,
    Entity::Collaborator,
    Entity::Contribution,
    Entity::Issue,
    Entity::ExternalContribution,
    Entity::Repository,
    Entity::Organisation,
];

/// Create (or upgrade) the schema in the configured database.
pub async fn run_migrations(config: &Config, reset: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool, reset).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. With `reset`, all harvest
/// tables are dropped first.
pub async fn ensure_schema(pool: &SqlitePool, reset: bool) -> Result<()> {
    if reset {
        // Children before parents, or the implicit delete trips the foreign keys
        for entity in DROP_ORDER {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", entity.table()))
                .execute(pool)
                .await?;
        }
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organisations (
            id INTEGER PRIMARY KEY,
            login TEXT NOT NULL UNIQUE,
            name TEXT,
            description TEXT,
            public_repos INTEGER NOT NULL DEFAULT 0,
            followers INTEGER NOT NULL DEFAULT 0,
            html_url TEXT,
            created_at TEXT,
            harvested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // A user belongs to many organisations: one row per membership
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id INTEGER NOT NULL,
            organisation_id INTEGER NOT NULL,
            login TEXT NOT NULL,
            site_admin INTEGER NOT NULL DEFAULT 0,
            avatar_url TEXT,
            PRIMARY KEY (id, organisation_id),
            FOREIGN KEY (organisation_id) REFERENCES organisations(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            full_name TEXT,
            organisation TEXT,
            description TEXT,
            fork INTEGER NOT NULL DEFAULT 0,
            private INTEGER NOT NULL DEFAULT 0,
            stars INTEGER NOT NULL DEFAULT 0,
            forks INTEGER NOT NULL DEFAULT 0,
            watchers INTEGER NOT NULL DEFAULT 0,
            open_issues INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            html_url TEXT,
            created_at TEXT,
            updated_at TEXT,
            pushed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS community_profiles (
            repository_id INTEGER PRIMARY KEY,
            health_percentage INTEGER NOT NULL DEFAULT 0,
            has_code_of_conduct INTEGER NOT NULL DEFAULT 0,
            has_contributing INTEGER NOT NULL DEFAULT 0,
            has_issue_template INTEGER NOT NULL DEFAULT 0,
            has_pull_request_template INTEGER NOT NULL DEFAULT 0,
            has_license INTEGER NOT NULL DEFAULT 0,
            has_readme INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY (repository_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pull_requests (
            id INTEGER PRIMARY KEY,
            repository_id INTEGER NOT NULL,
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            state TEXT NOT NULL,
            author TEXT,
            created_at TEXT,
            updated_at TEXT,
            closed_at TEXT,
            merged_at TEXT,
            FOREIGN KEY (repository_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            sha TEXT NOT NULL,
            message TEXT NOT NULL,
            author_login TEXT,
            author_name TEXT,
            author_email TEXT,
            committed_at TEXT,
            UNIQUE(repository_id, sha),
            FOREIGN KEY (repository_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            id INTEGER PRIMARY KEY,
            organisation TEXT NOT NULL,
            repository TEXT,
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            state TEXT NOT NULL,
            author TEXT,
            is_pull_request INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            closed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collaborators (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            login TEXT NOT NULL,
            role TEXT NOT NULL,
            UNIQUE(repository_id, login),
            FOREIGN KEY (repository_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            user_id INTEGER,
            login TEXT NOT NULL,
            contributions INTEGER NOT NULL DEFAULT 0,
            UNIQUE(repository_id, login),
            FOREIGN KEY (repository_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS external_contributions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_org TEXT NOT NULL,
            project_name TEXT NOT NULL,
            login TEXT NOT NULL,
            contributions INTEGER NOT NULL DEFAULT 0,
            UNIQUE(project_org, project_name, login)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_login ON members(login)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repositories_name ON repositories(name)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pull_requests_repository ON pull_requests(repository_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_issues_organisation ON issues(organisation)")
        .execute(pool)
        .await?;

    Ok(())
}
