//! Pipeline configuration, resolvable from the environment.

use miette::Diagnostic;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::status::PollConfig;

/// HTTP basic credentials for the deposit endpoint.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

// The password stays out of Debug output and therefore out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything an ingest run needs to know about its environment.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// Deposit endpoint chunks are POSTed to.
    pub endpoint: Url,
    pub credentials: Credentials,
    /// Upper bound on files per content chunk.
    pub max_files_per_chunk: usize,
    pub poll: PollConfig,
}

impl IngestConfig {
    pub const DEFAULT_MAX_FILES_PER_CHUNK: usize = 1000;

    pub fn new(endpoint: Url, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            max_files_per_chunk: Self::DEFAULT_MAX_FILES_PER_CHUNK,
            poll: PollConfig::default(),
        }
    }

    #[must_use]
    pub fn with_max_files_per_chunk(mut self, bound: usize) -> Self {
        self.max_files_per_chunk = bound;
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Resolve configuration from `PACKFERRY_*` environment variables, with
    /// a `.env` file honored when present.
    ///
    /// Required: `PACKFERRY_ENDPOINT`, `PACKFERRY_USERNAME`,
    /// `PACKFERRY_PASSWORD`. Optional: `PACKFERRY_MAX_FILES_PER_CHUNK`,
    /// `PACKFERRY_POLL_INTERVAL_SECS`, `PACKFERRY_POLL_CEILING_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let endpoint = require("PACKFERRY_ENDPOINT")?;
        let endpoint = Url::parse(&endpoint).map_err(|source| ConfigError::BadUrl {
            name: "PACKFERRY_ENDPOINT",
            value: endpoint,
            source,
        })?;
        let username = require("PACKFERRY_USERNAME")?;
        let password = require("PACKFERRY_PASSWORD")?;

        let mut config = Self::new(endpoint, Credentials::new(username, password));
        if let Some(bound) = parse_var("PACKFERRY_MAX_FILES_PER_CHUNK")? {
            if bound == 0 {
                return Err(ConfigError::BadNumber {
                    name: "PACKFERRY_MAX_FILES_PER_CHUNK",
                    value: "0".to_string(),
                });
            }
            config.max_files_per_chunk = bound;
        }
        if let Some(secs) = parse_var("PACKFERRY_POLL_INTERVAL_SECS")? {
            config.poll.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var("PACKFERRY_POLL_CEILING_SECS")? {
            config.poll.ceiling = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing { name })
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::BadNumber { name, value }),
        Err(_) => Ok(None),
    }
}

/// Problems resolving configuration from the environment.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing environment variable {name}")]
    #[diagnostic(
        code(packferry::config::missing),
        help("set the variable in the environment or a .env file")
    )]
    Missing { name: &'static str },

    #[error("{name} is not a valid URL: {value}")]
    #[diagnostic(code(packferry::config::bad_url))]
    BadUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} is not a usable number: {value}")]
    #[diagnostic(code(packferry::config::bad_number))]
    BadNumber { name: &'static str, value: String },
}
