//! # suitectl
//!
//! Runs the test suites declared in a project file, locally in containers
//! or on the remote grid, and exits with a code derived from their verdicts.
//!
//! ## Usage
//!
//! ```bash
//! # Run every suite in .sauce/config.yml
//! suitectl run
//!
//! # Validate configuration and tunnels without starting jobs
//! suitectl run --dry-run
//!
//! # Check the project file only
//! suitectl validate -c path/to/config.yml
//!
//! # Also confirm the referenced tunnels are up
//! suitectl validate --check-tunnels
//! ```

mod local;
mod report;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use local::ContainerRunner;
use report::TerminalReporter;
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use suitectl_core::{
    DEFAULT_CONFIG_PATH, EXIT_SETUP_FAILURE, EXIT_SUCCESS, Overrides, Project, Region,
    RunOptions, RunOrchestrator, Services, TestEnv, TunnelGate,
};
use suitectl_proto::LocalRunner;
use suitectl_sauce::{ACCESS_KEY_ENV, SauceClient, SauceConfig, USERNAME_ENV};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Where suites run, overriding the project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestEnvArg {
    /// Run every suite locally in a container
    Docker,
    /// Run every suite on the remote grid
    Sauce,
}

impl From<TestEnvArg> for TestEnv {
    fn from(arg: TestEnvArg) -> Self {
        match arg {
            TestEnvArg::Docker => TestEnv::Docker,
            TestEnvArg::Sauce => TestEnv::Sauce,
        }
    }
}

/// suitectl - run test suites locally or on a remote grid
#[derive(Parser, Debug)]
#[command(name = "suitectl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the suites declared in the project file
    Run(RunArgs),

    /// Load and validate the project file without running anything
    Validate(ValidateArgs),
}

/// Grid account credentials.
#[derive(Args, Debug)]
struct Credentials {
    /// Grid username
    #[arg(long, env = USERNAME_ENV, hide_env_values = true)]
    username: Option<String>,

    /// Grid access key
    #[arg(long, env = ACCESS_KEY_ENV, hide_env_values = true)]
    access_key: Option<String>,
}

impl Credentials {
    fn client(self, region: Region) -> Result<SauceClient> {
        let username = self
            .username
            .with_context(|| format!("{USERNAME_ENV} not set"))?;
        let access_key = self
            .access_key
            .with_context(|| format!("{ACCESS_KEY_ENV} not set"))?;
        SauceClient::new(SauceConfig::new(username, access_key, region)?)
            .context("Failed to create API client")
    }
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Also check that every referenced tunnel is up (needs credentials)
    #[arg(long)]
    check_tunnels: bool,

    #[command(flatten)]
    credentials: Credentials,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Run only the suite with this name
    #[arg(long)]
    suite: Option<String>,

    /// Validate suites and tunnels without starting jobs
    #[arg(long)]
    dry_run: bool,

    /// Stop every running suite after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Cap on concurrent remote jobs (never raises the account limit)
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Hard ceiling on concurrent remote jobs
    #[arg(long, value_name = "N")]
    concurrency_ceiling: Option<usize>,

    /// Force every suite into one test environment
    #[arg(long, value_enum)]
    test_env: Option<TestEnvArg>,

    /// Environment variable injected into every suite (repeatable)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Grid region, overriding the project file
    #[arg(long)]
    region: Option<String>,

    /// Seconds between job status reads
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Write the run result as JSON to this file
    #[arg(long, value_name = "FILE")]
    json_report: Option<PathBuf>,

    /// Container tool used for docker-mode suites
    #[arg(long, default_value = "docker")]
    container_tool: String,

    #[command(flatten)]
    credentials: Credentials,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the report
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(cli.color.should_use_colors())
        .init();

    if !cli.color.should_use_colors() {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Run(args) => run_command(&cli.config, args).await,
        Commands::Validate(args) => validate_command(&cli.config, args).await,
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            EXIT_SETUP_FAILURE
        }
    };
    std::process::exit(exit_code);
}

fn load_project(config: &Path, overrides: &Overrides) -> Result<Project> {
    Project::load(config, overrides)
        .with_context(|| format!("Invalid project file {}", config.display()))
}

async fn validate_command(config: &Path, args: ValidateArgs) -> Result<i32> {
    let project = load_project(config, &Overrides::default())?;
    let region = project.region()?;
    let suites = project.into_suites();
    let local = suites.iter().filter(|s| s.is_local()).count();

    if args.check_tunnels {
        let client = Arc::new(args.credentials.client(region)?);
        let failures = TunnelGate::new(client)
            .with_check_window(Duration::ZERO)
            .validate_all(&suites, &CancellationToken::new())
            .await;
        if !failures.is_empty() {
            for failure in &failures {
                eprintln!("{} {}", "✗".red(), failure);
            }
            return Ok(EXIT_SETUP_FAILURE);
        }
    }

    println!(
        "{} {} is valid: {} suite{} ({} local, {} remote) in {}",
        "✓".green(),
        config.display(),
        suites.len(),
        if suites.len() == 1 { "" } else { "s" },
        local,
        suites.len() - local,
        region
    );
    Ok(EXIT_SUCCESS)
}

async fn run_command(config: &Path, args: RunArgs) -> Result<i32> {
    let mut overrides = Overrides {
        test_env: args.test_env.map(Into::into),
        region: args.region.clone(),
        concurrency: args.concurrency,
        concurrency_ceiling: args.concurrency_ceiling,
        suite: args.suite.clone(),
        ..Overrides::default()
    };
    for pair in &args.env {
        overrides.push_env(pair)?;
    }

    let project = load_project(config, &overrides)?;
    let region = project.region()?;

    let mut options = RunOptions::new()
        .dry_run(args.dry_run)
        .abort_on_failure(args.fail_fast)
        .with_artifacts(project.artifact_policy()?);
    options.concurrency = project.concurrency_limits();
    if let Some(secs) = args.poll_interval {
        options = options.with_poll_interval(Duration::from_secs(secs.max(1)));
    }

    let client = Arc::new(args.credentials.client(region)?);

    let suites = project.into_suites();
    let mut services = Services::remote(client.clone(), client.clone(), client);
    if suites.iter().any(|s| s.is_local()) {
        let runner: Arc<dyn LocalRunner> = Arc::new(ContainerRunner::new(&args.container_tool));
        services = services.with_local(runner);
    }

    info!(region = %region, suites = suites.len(), "Loaded project");

    let reporter = Arc::new(TerminalReporter::new());
    let progress = reporter.clone();
    let orchestrator = RunOrchestrator::new(services, options)
        .on_progress(Box::new(move |event| progress.handle_progress(event)));

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping running suites");
            cancel.cancel();
        }
    });

    let run = orchestrator
        .run(suites)
        .await
        .context("Invalid run configuration")?;

    reporter.print_summary(&run);

    if let Some(path) = &args.json_report {
        report::write_json_report(path, &run)?;
        println!("{}", format!("Report written: {}", path.display()).dimmed());
    }

    Ok(run.exit_code())
}
