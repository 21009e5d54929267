//! Command-line entry for a single test run.
//!
//! Flags are layered on top of the configuration file and `-D` overrides, so
//! the most specific source wins. Command functions return [`CliResult`];
//! only [`run`] turns errors into an exit status.

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use crate::classpath::InstallLocator;
use crate::config::RunConfig;
use crate::discovery::DirectoryScanner;
use crate::error::ConfigError;
use crate::launcher::ProcessLauncher;
use crate::runner::{RunError, RunSummary, TestRun};

/// Exit status for a run whose units failed.
pub const EXIT_TEST_FAILURES: u8 = 1;
/// Exit status for configuration errors and harness failures.
pub const EXIT_HARNESS_ERROR: u8 = 2;

/// Error type for CLI operations: a printable message and an exit status.
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: u8,
}

impl CliError {
    fn new(message: impl Into<String>, exit_code: u8) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::new(describe(&err), EXIT_HARNESS_ERROR)
    }
}

impl From<RunError> for CliError {
    fn from(err: RunError) -> Self {
        let code = match err {
            RunError::TestFailures { .. } => EXIT_TEST_FAILURES,
            RunError::Harness(_) => EXIT_HARNESS_ERROR,
        };
        CliError::new(describe(&err), code)
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Run GWT-style tests, one forked toolchain process per test class.
#[derive(Parser, Debug)]
#[command(name = "gwt-test", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project root (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Skip the run entirely
    #[arg(long)]
    pub skip: bool,

    /// Skip the run entirely
    #[arg(long)]
    pub skip_tests: bool,

    /// Skip the run entirely (deprecated spelling)
    #[arg(long)]
    pub skip_exec: bool,

    /// Warn instead of failing when tests fail
    #[arg(long)]
    pub test_failure_ignore: bool,

    /// Comma separated ant-style include patterns
    #[arg(long, value_delimiter = ',', value_name = "PATTERNS")]
    pub includes: Vec<String>,

    /// Comma separated ant-style exclude patterns
    #[arg(long, value_delimiter = ',', value_name = "PATTERNS")]
    pub excludes: Vec<String>,

    /// Run style: manual, htmlunit, selenium, or a custom style
    #[arg(long)]
    pub mode: Option<String>,

    /// Browsers emulated in htmlunit mode, e.g. FF17,IE9
    #[arg(long, value_name = "BROWSERS")]
    pub htmlunit: Option<String>,

    /// Selenium remote control target
    #[arg(long, value_name = "TARGET")]
    pub selenium: Option<String>,

    /// Output directory for generated code
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Directory receiving test reports
    #[arg(long, value_name = "DIR")]
    pub reports_directory: Option<PathBuf>,

    /// Per-test timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Set any configuration key, e.g. -D draft_compile=true
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub define: Vec<String>,
}

impl Cli {
    /// Build the effective configuration: file, then `-D`, then dedicated flags.
    ///
    /// Validation runs once on the layered result and is skipped when the
    /// run itself is skipped.
    pub fn load_config(&self) -> CliResult<RunConfig> {
        let mut config = RunConfig::load(self.config.as_deref(), &self.define)?;

        config.skip |= self.skip;
        config.skip_tests |= self.skip_tests;
        config.skip_exec |= self.skip_exec;
        config.test_failure_ignore |= self.test_failure_ignore;
        if !self.includes.is_empty() {
            config.includes = self.includes.clone();
        }
        if !self.excludes.is_empty() {
            config.excludes = self.excludes.clone();
        }
        if let Some(mode) = &self.mode {
            config.mode = mode.clone();
        }
        if let Some(htmlunit) = &self.htmlunit {
            config.htmlunit = htmlunit.clone();
        }
        if let Some(selenium) = &self.selenium {
            config.selenium = Some(selenium.clone());
        }
        if let Some(out) = &self.out {
            config.out = out.clone();
        }
        if let Some(reports) = &self.reports_directory {
            config.reports_directory = reports.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(dir) = &self.project_dir {
            config.project.base_dir = dir.clone();
        }
        if config.project.base_dir.is_relative() {
            let cwd = env::current_dir().map_err(|err| {
                CliError::new(format!("cannot determine working directory: {err}"), EXIT_HARNESS_ERROR)
            })?;
            config.project.base_dir = cwd.join(&config.project.base_dir);
        }

        if !config.is_skipped() {
            config.validate()?;
        }
        Ok(config)
    }
}

/// Execute one run with the production collaborators.
pub fn execute(cli: &Cli) -> CliResult<RunSummary> {
    let config = cli.load_config()?;
    debug!(?config, "effective configuration");

    let locator = InstallLocator::from_config(&config.support);
    let launcher = ProcessLauncher::new();
    let run = TestRun::new(&config, &config.project, &DirectoryScanner, &locator, &launcher);
    Ok(run.execute().into_result()?)
}

/// CLI entry point; maps the outcome to a process exit status.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(summary) => {
            debug!(?summary, "run complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err.message);
            ExitCode::from(err.exit_code)
        }
    }
}

/// Render an error with its chain of causes.
fn describe(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
