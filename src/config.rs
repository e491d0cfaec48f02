use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    /// Projects outside the monitored organisations whose contributors are
    /// recorded once per run and later pruned to organisation members.
    #[serde(default)]
    pub external_projects: Vec<ExternalProject>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_max_rate_limit_wait_secs() -> u64 {
    900
}
fn default_user_agent() -> String {
    concat!("org-harvest/", env!("CARGO_PKG_VERSION")).to_string()
}

/// A project hosted outside the monitored organisations.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ExternalProject {
    pub org: String,
    pub name: String,
}

impl ExternalProject {
    pub fn new(org: &str, name: &str) -> Self {
        Self {
            org: org.to_string(),
            name: name.to_string(),
        }
    }
}

impl Config {
    /// Configuration used when no config file exists: database under
    /// `./data`, public GitHub API, no external projects.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/harvest.sqlite"),
            },
            github: GithubConfig::default(),
            external_projects: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.github.per_page) {
            anyhow::bail!("github.per_page must be in [1, 100]");
        }

        if self.github.timeout_secs == 0 {
            anyhow::bail!("github.timeout_secs must be > 0");
        }

        if !self.github.api_url.starts_with("http") {
            anyhow::bail!(
                "github.api_url must be an http(s) URL, got '{}'",
                self.github.api_url
            );
        }

        for project in &self.external_projects {
            if project.org.trim().is_empty() || project.name.trim().is_empty() {
                anyhow::bail!("external_projects entries need a non-empty org and name");
            }
        }

        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Load the config at `path`, falling back to [`Config::minimal`] when the
/// file does not exist. A file that exists but fails to parse is an error.
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}
