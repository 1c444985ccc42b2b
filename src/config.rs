use crate::services::github_store::GitHubSettings;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub github_owner: String,
    pub github_repo: String,
    pub github_branch: String,
    pub github_token_key: String,
    pub github_api_base: String,
    pub max_upload_mb: u64,
    pub admin_default_password: String,
    pub session_ttl_hours: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("github_owner", &self.github_owner)
            .field("github_repo", &self.github_repo)
            .field("github_branch", &self.github_branch)
            .field("github_token_key", &self.github_token_key)
            .field("github_api_base", &self.github_api_base)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Blog and document store API")]
pub struct Args {
    /// Host to bind to (overrides BLOG_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BLOG_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides BLOG_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// GitHub account owning the document repository (overrides BLOG_STORE_GITHUB_OWNER)
    #[arg(long)]
    pub github_owner: Option<String>,

    /// GitHub repository used as document storage (overrides BLOG_STORE_GITHUB_REPO)
    #[arg(long)]
    pub github_repo: Option<String>,

    /// Branch uploads are committed to (overrides BLOG_STORE_GITHUB_BRANCH)
    #[arg(long)]
    pub github_branch: Option<String>,

    /// Maximum accepted upload, in megabytes (overrides BLOG_STORE_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let defaults = GitHubSettings::default();

        // --- Environment fallback ---
        let env_host = env_or("BLOG_STORE_HOST", "0.0.0.0");
        let env_port = parse_env("BLOG_STORE_PORT", 3000u16)?;
        let env_db = env_or("BLOG_STORE_DATABASE_URL", "sqlite://./data/blog_store.db");
        let env_owner = env_or("BLOG_STORE_GITHUB_OWNER", "");
        let env_repo = env_or("BLOG_STORE_GITHUB_REPO", "");
        let env_branch = env_or("BLOG_STORE_GITHUB_BRANCH", &defaults.branch);
        let env_max_upload = parse_env("BLOG_STORE_MAX_UPLOAD_MB", 10u64)?;
        let env_session_ttl = parse_env("BLOG_STORE_SESSION_TTL_HOURS", 12u32)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            github_owner: args.github_owner.unwrap_or(env_owner),
            github_repo: args.github_repo.unwrap_or(env_repo),
            github_branch: args.github_branch.unwrap_or(env_branch),
            github_token_key: env_or("BLOG_STORE_GITHUB_TOKEN_KEY", &defaults.token_key),
            github_api_base: env_or("BLOG_STORE_GITHUB_API_BASE", &defaults.api_base),
            max_upload_mb: args.max_upload_mb.unwrap_or(env_max_upload),
            admin_default_password: env_or("BLOG_STORE_ADMIN_PASSWORD", "admin123"),
            session_ttl_hours: env_session_ttl,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Lifetime of an administrator session token.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_ttl_hours))
    }

    pub fn github_settings(&self) -> GitHubSettings {
        GitHubSettings {
            owner: self.github_owner.clone(),
            repo: self.github_repo.clone(),
            branch: self.github_branch.clone(),
            token_key: self.github_token_key.clone(),
            api_base: self.github_api_base.clone(),
            ..Default::default()
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_settings_keep_raw_base_default() {
        let cfg = AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            database_url: "sqlite::memory:".into(),
            github_owner: "alice".into(),
            github_repo: "docs".into(),
            github_branch: "main".into(),
            github_token_key: "token".into(),
            github_api_base: "http://localhost:9999".into(),
            max_upload_mb: 2,
            admin_default_password: "pw".into(),
            session_ttl_hours: 12,
        };

        let settings = cfg.github_settings();
        assert_eq!(settings.owner, "alice");
        assert_eq!(settings.api_base, "http://localhost:9999");
        assert_eq!(settings.raw_base, GitHubSettings::default().raw_base);
        assert_eq!(cfg.max_upload_bytes(), 2 * 1024 * 1024);
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.session_ttl(), chrono::Duration::hours(12));
        assert!(!format!("{:?}", cfg).contains("pw"));
    }

    #[test]
    fn parse_env_falls_back_when_unset() {
        let port: u16 = parse_env("BLOG_STORE_TEST_UNSET_PORT", 4242).unwrap();
        assert_eq!(port, 4242);
    }
}
