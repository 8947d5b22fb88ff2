use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

use crate::extract::ExtractOptions;
use crate::reddit::TimeWindow;

/// Database file used when `--database` is not given.
pub const DEFAULT_DATABASE: &str = "snoo_watch_db.sqlite3";

pub const DEFAULT_API_URL: &str = "https://oauth.reddit.com";
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential {0}: set it in the credentials file or the environment")]
    MissingCredential(&'static str),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to read credentials file {path}: {source}")]
    ReadCredentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse credentials file {path}: {source}")]
    ParseCredentials {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "snoo-watch",
    about = "Record which users comment on a subreddit's top posts"
)]
pub struct Cli {
    /// The database to write to, which will be created if it does not exist
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// The name of the subreddit to watch
    #[arg(short, long)]
    pub subreddit: String,

    /// Scrape the comments of the top posts aggregated by this time
    #[arg(short, long, value_enum, default_value_t = TimeWindow::Day)]
    pub top: TimeWindow,

    /// Set the logging level, defaults to WARNING
    #[arg(short, long = "log", value_enum, ignore_case = true)]
    pub log_level: Option<LogLevel>,

    /// Stop after this many submissions (default: no limit)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Expand at most this many "load more" stubs per submission (default: all)
    #[arg(long)]
    pub expand_limit: Option<usize>,

    /// TOML file holding client_id, client_secret and user_agent
    #[arg(long)]
    pub credentials: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level. `tracing` has no level above
    /// error, so critical maps onto it.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

/// Reddit application credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialsFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    user_agent: Option<String>,
}

impl Credentials {
    /// Load credentials from an optional TOML file, filling anything it
    /// leaves out from `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET` and
    /// `REDDIT_USER_AGENT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is missing from both sources.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let from_file = match file {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::ReadCredentials {
                        path: path.to_path_buf(),
                        source,
                    })?;
                toml::from_str(&text).map_err(|source| ConfigError::ParseCredentials {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => CredentialsFile::default(),
        };

        Ok(Self {
            client_id: pick(from_file.client_id, "REDDIT_CLIENT_ID")?,
            client_secret: pick(from_file.client_secret, "REDDIT_CLIENT_SECRET")?,
            user_agent: pick(from_file.user_agent, "REDDIT_USER_AGENT")?,
        })
    }
}

fn pick(value: Option<String>, env_name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| optional_env(env_name))
        .ok_or(ConfigError::MissingCredential(env_name))
}

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub subreddit: String,
    pub window: TimeWindow,
    pub limit: Option<usize>,
    pub expand_limit: Option<usize>,
    pub credentials: Credentials,
    pub api_url: String,
    pub auth_url: String,
}

impl Config {
    /// Build the configuration from parsed arguments and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be loaded.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Ok(Self {
            database_path: cli.database.clone(),
            subreddit: normalize_subreddit(&cli.subreddit),
            window: cli.top,
            limit: cli.limit,
            expand_limit: cli.expand_limit,
            credentials: Credentials::load(cli.credentials.as_deref())?,
            api_url: env_or_default("REDDIT_API_URL", DEFAULT_API_URL),
            auth_url: env_or_default("REDDIT_AUTH_URL", DEFAULT_AUTH_URL),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subreddit.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "subreddit".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if !self
            .subreddit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+')
        {
            return Err(ConfigError::InvalidValue {
                name: "subreddit".to_string(),
                message: format!("'{}' is not a valid subreddit name", self.subreddit),
            });
        }
        if self.limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "limit".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (name, url) in [("REDDIT_API_URL", &self.api_url), ("REDDIT_AUTH_URL", &self.auth_url)] {
            if let Err(e) = url::Url::parse(url) {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            subreddit: self.subreddit.clone(),
            window: self.window,
            limit: self.limit,
            expand_limit: self.expand_limit,
        }
    }
}

/// Accept `rust`, `r/rust` and `/r/rust` alike.
fn normalize_subreddit(name: &str) -> String {
    let name = name.trim().trim_start_matches('/');
    name.strip_prefix("r/").unwrap_or(name).trim_end_matches('/').to_string()
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    optional_env(name).unwrap_or_else(|| default.to_string())
}
