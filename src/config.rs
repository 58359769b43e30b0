//! Configuration for e2e-relay.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (run id, branch, token, paths)
//! 2. Environment variables (E2E_RELAY_*, AWS_*)
//! 3. Config file (.e2e-relay/config.yaml)
//! 4. Defaults
//!
//! Config file discovery:
//! - An explicit path (`--config` / E2E_RELAY_CONFIG) wins
//! - Otherwise searches the current directory and parents for
//!   .e2e-relay/config.yaml
//! - Relative paths in the config file resolve against the directory that
//!   contains `.e2e-relay/`
//!
//! Nothing is cached globally: callers load a [`Settings`] once and pass
//! the pieces they need to the components that use them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::github::{InputNames, DEFAULT_API_URL, DEFAULT_WEB_URL};
use crate::adapters::sigv4::{Credentials, MAX_PRESIGN_SECS};
use crate::core::poll::{
    PollPolicy, COMPLETION_INTERVAL, COMPLETION_MAX_ATTEMPTS, RENDEZVOUS_INTERVAL,
    RENDEZVOUS_MAX_ATTEMPTS,
};
use crate::core::publish::DEFAULT_PRESIGN_TTL;
use crate::core::RunPolicy;
use crate::domain::RunIdentity;

pub const ENV_RUN_ID: &str = "HEROKU_TEST_RUN_ID";
pub const ENV_BRANCH: &str = "HEROKU_TEST_RUN_BRANCH";
pub const ENV_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_CONFIG: &str = "E2E_RELAY_CONFIG";
pub const ENV_BUCKET: &str = "E2E_RELAY_BUCKET";
pub const ENV_REGION: &str = "E2E_RELAY_REGION";
pub const ENV_ENDPOINT: &str = "E2E_RELAY_ENDPOINT";
pub const ENV_REPO: &str = "E2E_RELAY_REPO";
pub const ENV_WORKFLOW: &str = "E2E_RELAY_WORKFLOW";
pub const ENV_API_URL: &str = "E2E_RELAY_API_URL";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Misspelled name some CI setups still export
pub const ENV_AWS_SECRET_ACCESS_KEY_LEGACY: &str = "AWS_SECRET_ACCESS_KEY_ID";
pub const ENV_AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

const CONFIG_DIR: &str = ".e2e-relay";
const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_SOURCE_DIR: &str = "dist";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {name}")]
    Missing { name: String },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A value that must never be printed
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

// ============================================================================
// Config file schema
// ============================================================================

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// S3-compatible endpoint; switches to path-style addressing
    pub endpoint: Option<String>,
    pub presign_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowSection {
    /// `owner/name`
    pub repo: Option<String>,
    /// Workflow id or file name
    pub workflow: Option<String>,
    pub api_url: Option<String>,
    pub web_url: Option<String>,
    pub run_id_input: Option<String>,
    pub artifact_url_input: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingSection {
    #[serde(default)]
    pub rendezvous: PollSection,
    #[serde(default)]
    pub completion: PollSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollSection {
    pub interval_seconds: Option<u64>,
    pub max_attempts: Option<u32>,
    /// Defaults to the interval
    pub attempt_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    pub source_dir: Option<String>,
    pub work_dir: Option<String>,
    #[serde(default)]
    pub keep_artifact: bool,
}

// ============================================================================
// Resolved settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: Secret,
    pub session_token: Option<Secret>,
}

impl StorageSettings {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.expose().to_string(),
            session_token: self.session_token.as_ref().map(|s| s.expose().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub repo: String,
    pub workflow: String,
    pub api_url: String,
    pub web_url: String,
    pub inputs: InputNames,
    pub token: Secret,
}

/// Merged file + environment settings. Required values stay optional here
/// and are checked by the `require_*` accessors, so commands only fail on
/// what they actually use.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_file: Option<PathBuf>,
    pub bucket: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<Secret>,
    pub session_token: Option<Secret>,
    pub repo: Option<String>,
    pub workflow: Option<String>,
    pub api_url: String,
    pub web_url: String,
    pub inputs: InputNames,
    pub policy: RunPolicy,
    pub source_dir: PathBuf,
    pub work_dir: PathBuf,
    pub keep_artifact: bool,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub run_id: Option<String>,
    pub branch: Option<String>,
    pub token: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub keep_artifact: bool,
}

impl Settings {
    /// Load settings from the process environment and config file
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::Read {
            path: PathBuf::from("."),
            source: e,
        })?;
        Self::load_with(explicit_path, &cwd, |name| std::env::var(name).ok())
    }

    /// Load settings with an injected environment lookup
    pub fn load_with<F>(explicit_path: Option<&Path>, cwd: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_path = match explicit_path {
            Some(path) => Some(path.to_path_buf()),
            None => env(ENV_CONFIG)
                .map(PathBuf::from)
                .or_else(|| find_config_file(cwd)),
        };

        let (file, base_dir) = match &config_path {
            Some(path) => {
                let file = load_config_file(path)?;
                let base = path
                    .parent() // .e2e-relay/
                    .and_then(|p| p.parent()) // project root
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| cwd.to_path_buf());
                (file, base)
            }
            None => (ConfigFile::default(), cwd.to_path_buf()),
        };

        let rendezvous = poll_policy(
            "polling.rendezvous",
            &file.polling.rendezvous,
            RENDEZVOUS_MAX_ATTEMPTS,
            RENDEZVOUS_INTERVAL,
        )?;
        let completion = poll_policy(
            "polling.completion",
            &file.polling.completion,
            COMPLETION_MAX_ATTEMPTS,
            COMPLETION_INTERVAL,
        )?;

        let presign_ttl = match file.storage.presign_ttl_seconds {
            Some(secs) if secs == 0 || secs > MAX_PRESIGN_SECS => {
                return Err(ConfigError::Invalid {
                    name: "storage.presign_ttl_seconds".to_string(),
                    reason: format!("{} is outside 1..={}", secs, MAX_PRESIGN_SECS),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_PRESIGN_TTL,
        };

        let defaults = InputNames::default();
        let inputs = InputNames {
            run_id: file.workflow.run_id_input.clone().unwrap_or(defaults.run_id),
            artifact_url: file
                .workflow
                .artifact_url_input
                .clone()
                .unwrap_or(defaults.artifact_url),
        };

        let source_dir = resolve_path(
            &base_dir,
            file.build.source_dir.as_deref().unwrap_or(DEFAULT_SOURCE_DIR),
        );
        let work_dir = file
            .build
            .work_dir
            .as_deref()
            .map(|p| resolve_path(&base_dir, p))
            .unwrap_or_else(|| base_dir.clone());

        Ok(Self {
            config_file: config_path,
            bucket: env(ENV_BUCKET).or(file.storage.bucket),
            region: env(ENV_REGION)
                .or_else(|| env(ENV_AWS_REGION))
                .or(file.storage.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: env(ENV_ENDPOINT).or(file.storage.endpoint),
            access_key_id: env(ENV_AWS_ACCESS_KEY_ID),
            secret_access_key: env(ENV_AWS_SECRET_ACCESS_KEY)
                .or_else(|| env(ENV_AWS_SECRET_ACCESS_KEY_LEGACY))
                .map(Secret::new),
            session_token: env(ENV_AWS_SESSION_TOKEN).map(Secret::new),
            repo: env(ENV_REPO).or(file.workflow.repo),
            workflow: env(ENV_WORKFLOW).or(file.workflow.workflow),
            api_url: env(ENV_API_URL)
                .or(file.workflow.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            web_url: file
                .workflow
                .web_url
                .unwrap_or_else(|| DEFAULT_WEB_URL.to_string()),
            inputs,
            policy: RunPolicy {
                presign_ttl,
                rendezvous,
                completion,
            },
            source_dir,
            work_dir,
            keep_artifact: file.build.keep_artifact,
        })
    }

    /// Storage settings, failing on missing bucket or credentials
    pub fn require_storage(&self) -> Result<StorageSettings, ConfigError> {
        Ok(StorageSettings {
            bucket: required(ENV_BUCKET, self.bucket.clone())?,
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id: required(ENV_AWS_ACCESS_KEY_ID, self.access_key_id.clone())?,
            secret_access_key: self
                .secret_access_key
                .clone()
                .ok_or_else(|| missing(ENV_AWS_SECRET_ACCESS_KEY))?,
            session_token: self.session_token.clone(),
        })
    }

    /// Workflow settings, failing on missing repository, workflow or token
    pub fn require_workflow(&self, token: Option<String>) -> Result<WorkflowSettings, ConfigError> {
        let repo = required(ENV_REPO, self.repo.clone())?;
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(ConfigError::Invalid {
                name: ENV_REPO.to_string(),
                reason: format!("expected owner/name, got '{}'", repo),
            });
        }

        Ok(WorkflowSettings {
            repo,
            workflow: required(ENV_WORKFLOW, self.workflow.clone())?,
            api_url: self.api_url.clone(),
            web_url: self.web_url.clone(),
            inputs: self.inputs.clone(),
            token: Secret::new(required(ENV_TOKEN, token)?),
        })
    }

    /// Identity of the run, failing on missing or unusable values
    pub fn require_identity(overrides: &Overrides) -> Result<RunIdentity, ConfigError> {
        let run_id = required(ENV_RUN_ID, overrides.run_id.clone())?;
        validate_run_id(&run_id)?;
        let branch = required(ENV_BRANCH, overrides.branch.clone())?;
        Ok(RunIdentity::new(run_id, branch))
    }

    pub fn source_dir(&self, overrides: &Overrides) -> PathBuf {
        overrides
            .source_dir
            .clone()
            .unwrap_or_else(|| self.source_dir.clone())
    }

    pub fn work_dir(&self, overrides: &Overrides) -> PathBuf {
        overrides
            .work_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.clone())
    }

    pub fn keep_artifact(&self, overrides: &Overrides) -> bool {
        overrides.keep_artifact || self.keep_artifact
    }
}

fn missing(name: &str) -> ConfigError {
    ConfigError::Missing {
        name: name.to_string(),
    }
}

fn required(name: &str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(name))
}

/// The run id becomes a file name and a storage key segment
pub fn validate_run_id(run_id: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: ENV_RUN_ID.to_string(),
        reason: reason.to_string(),
    };

    if run_id.contains('/') || run_id.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if run_id.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }
    if run_id == "." || run_id.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    Ok(())
}

fn poll_policy(
    name: &str,
    section: &PollSection,
    default_attempts: u32,
    default_interval: Duration,
) -> Result<PollPolicy, ConfigError> {
    let max_attempts = section.max_attempts.unwrap_or(default_attempts);
    if max_attempts == 0 {
        return Err(ConfigError::Invalid {
            name: format!("{}.max_attempts", name),
            reason: "must be at least 1".to_string(),
        });
    }
    let interval = section
        .interval_seconds
        .map(Duration::from_secs)
        .unwrap_or(default_interval);
    let policy = PollPolicy::new(max_attempts, interval);

    match section.attempt_timeout_seconds {
        Some(0) => Err(ConfigError::Invalid {
            name: format!("{}.attempt_timeout_seconds", name),
            reason: "must be at least 1".to_string(),
        }),
        Some(secs) => Ok(policy.with_attempt_timeout(Duration::from_secs(secs))),
        None => Ok(policy),
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
