//! Command-line interface for e2e-relay.
//!
//! Provides commands for relaying a build to the remote workflow and
//! waiting for its verdict, plus a few one-shot helpers for debugging a
//! setup (packaging only, checking a run's status, showing config).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::error;

use crate::adapters::{Archiver, GitHubWorkflows, S3BlobStore, WorkflowService, ZipArchiver};
use crate::config::{
    ConfigError, Overrides, Settings, WorkflowSettings, ENV_API_URL, ENV_BRANCH, ENV_CONFIG,
    ENV_ENDPOINT, ENV_RUN_ID, ENV_TOKEN,
};
use crate::core::{Orchestrator, RunError, RunPlan};
use crate::domain::RemoteRunId;

/// e2e-relay - Relay a build to a remote CI workflow and wait for the verdict
#[derive(Parser, Debug)]
#[command(name = "e2e-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .e2e-relay/config.yaml in this or a parent directory)
    #[arg(long, global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package, publish, dispatch, and wait for the remote run to finish
    Run(RunArgs),

    /// Package a directory into a zip archive without publishing it
    Package {
        /// Directory to package (defaults to the configured source dir)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Archive to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the status of a remote run
    Status {
        /// Run id assigned by the workflow system
        remote_run_id: String,

        /// API token
        #[arg(long, env = ENV_TOKEN, hide_env_values = true)]
        token: Option<String>,
    },

    /// Show resolved configuration (secrets redacted)
    Config,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Identifier of this test run
    #[arg(long, env = ENV_RUN_ID)]
    pub run_id: Option<String>,

    /// Branch to run the workflow on
    #[arg(long, env = ENV_BRANCH)]
    pub branch: Option<String>,

    /// API token for the workflow service
    #[arg(long, env = ENV_TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// Directory to package
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Directory to write the archive into
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep the local archive after publishing
    #[arg(long)]
    pub keep_artifact: bool,
}

impl From<RunArgs> for Overrides {
    fn from(args: RunArgs) -> Self {
        Self {
            run_id: args.run_id,
            branch: args.branch,
            token: args.token,
            source_dir: args.source,
            work_dir: args.work_dir,
            keep_artifact: args.keep_artifact,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<ExitCode> {
        let config = self.config;
        match self.command {
            Commands::Run(args) => Ok(relay(config, args.into()).await),
            Commands::Package { source, output } => {
                package(config, source, output).await?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Status {
                remote_run_id,
                token,
            } => {
                show_status(config, &remote_run_id, token).await?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Config => {
                show_config(config)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn workflow_client(settings: &WorkflowSettings) -> Result<GitHubWorkflows, ConfigError> {
    let client = GitHubWorkflows::new(
        settings.repo.clone(),
        settings.workflow.clone(),
        settings.token.expose(),
    )
    .map_err(|e| ConfigError::Invalid {
        name: ENV_API_URL.to_string(),
        reason: e.to_string(),
    })?;

    Ok(client
        .with_api_url(settings.api_url.clone())
        .with_web_url(settings.web_url.clone())
        .with_input_names(settings.inputs.clone()))
}

/// Build every collaborator up front so configuration problems surface
/// before any stage runs
fn prepare(config: Option<PathBuf>, overrides: &Overrides) -> Result<(Orchestrator, RunPlan), RunError> {
    let settings = Settings::load(config.as_deref())?;
    let identity = Settings::require_identity(overrides)?;
    let storage = settings.require_storage()?;
    let workflow = settings.require_workflow(overrides.token.clone())?;

    let store = S3BlobStore::new(
        storage.bucket.clone(),
        storage.region.clone(),
        storage.endpoint.as_deref(),
        storage.credentials(),
    )
    .map_err(|e| ConfigError::Invalid {
        name: ENV_ENDPOINT.to_string(),
        reason: e.to_string(),
    })?;

    let orchestrator = Orchestrator::new(
        Arc::new(ZipArchiver::new()),
        Arc::new(store),
        Arc::new(workflow_client(&workflow)?),
        settings.policy,
    );

    let plan = RunPlan {
        identity,
        source_dir: settings.source_dir(overrides),
        work_dir: settings.work_dir(overrides),
        keep_artifact: settings.keep_artifact(overrides),
    };

    Ok((orchestrator, plan))
}

/// Run the full relay and map the outcome to an exit code
async fn relay(config: Option<PathBuf>, overrides: Overrides) -> ExitCode {
    let (orchestrator, plan) = match prepare(config, &overrides) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(error = %e, "Cannot start run");
            println!("RESULT: {}", e.verdict());
            return ExitCode::from(e.exit_code());
        }
    };

    let report = orchestrator.run(&plan).await;
    println!("RESULT: {}", report.verdict());
    ExitCode::from(report.exit_code())
}

/// Package a directory only
async fn package(config: Option<PathBuf>, source: Option<PathBuf>, output: PathBuf) -> Result<()> {
    let source = match source {
        Some(source) => source,
        None => Settings::load(config.as_deref())?.source_dir,
    };

    let archiver = ZipArchiver::new();
    let size = archiver
        .archive(&source, &output)
        .await
        .with_context(|| format!("Failed to package {}", source.display()))?;

    println!("Packaged {} -> {} ({} bytes)", source.display(), output.display(), size);
    Ok(())
}

/// Show the status of a remote run
async fn show_status(config: Option<PathBuf>, remote_run_id: &str, token: Option<String>) -> Result<()> {
    let id = RemoteRunId::parse(remote_run_id)
        .with_context(|| format!("Invalid run ID: {}", remote_run_id))?;

    let settings = Settings::load(config.as_deref())?;
    let workflow = workflow_client(&settings.require_workflow(token)?)?;

    let status = workflow
        .get_run(&id)
        .await
        .with_context(|| format!("Failed to fetch run {}", id))?;

    println!("Run ID: {}", id);
    println!("Status: {}", status.state);
    println!(
        "Conclusion: {}",
        status
            .conclusion
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "(pending)".to_string())
    );
    if let Some(url) = status.html_url.or_else(|| workflow.run_url(&id)) {
        println!("Logs: {}", url);
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(config: Option<PathBuf>) -> Result<()> {
    let cfg = Settings::load(config.as_deref())?;
    let unset = || "(unset)".to_string();

    println!("e2e-relay configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Storage:");
    println!("  Bucket:      {}", cfg.bucket.clone().unwrap_or_else(unset));
    println!("  Region:      {}", cfg.region);
    println!("  Endpoint:    {}", cfg.endpoint.clone().unwrap_or_else(|| "(aws)".to_string()));
    println!("  Access key:  {}", cfg.access_key_id.clone().unwrap_or_else(unset));
    println!(
        "  Secret key:  {}",
        cfg.secret_access_key
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(unset)
    );
    println!("  URL expiry:  {}s", cfg.policy.presign_ttl.as_secs());
    println!();
    println!("Workflow:");
    println!("  Repository:  {}", cfg.repo.clone().unwrap_or_else(unset));
    println!("  Workflow:    {}", cfg.workflow.clone().unwrap_or_else(unset));
    println!("  API:         {}", cfg.api_url);
    println!(
        "  Inputs:      {}, {}",
        cfg.inputs.run_id, cfg.inputs.artifact_url
    );
    println!();
    println!("Polling:");
    for (label, policy) in [
        ("Rendezvous", cfg.policy.rendezvous),
        ("Completion", cfg.policy.completion),
    ] {
        println!(
            "  {}:  every {}s, {} attempts, {}s per attempt (at most {}s)",
            label,
            policy.interval.as_secs(),
            policy.max_attempts,
            policy.attempt_timeout.as_secs(),
            policy.ceiling().as_secs()
        );
    }
    println!();
    println!("Build:");
    println!("  Source:      {}", cfg.source_dir.display());
    println!("  Work dir:    {}", cfg.work_dir.display());
    println!("  Keep local:  {}", cfg.keep_artifact);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "e2e-relay",
            "run",
            "--run-id",
            "abc",
            "--branch",
            "main",
            "--token",
            "t",
            "--keep-artifact",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                let overrides = Overrides::from(args);
                assert_eq!(overrides.run_id.as_deref(), Some("abc"));
                assert_eq!(overrides.branch.as_deref(), Some("main"));
                assert!(overrides.keep_artifact);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
