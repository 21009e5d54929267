//! Runs GWT-style integration tests by forking one toolchain process per
//! discovered test class and reducing the outcomes to a build verdict.
//!
//! Typical usage:
//! ```no_run
//! use gwt_test_harness::{
//!     DirectoryScanner, InstallLocator, ProcessLauncher, ProjectLayout, RunConfig, SdkConfig,
//!     TestRun,
//! };
//!
//! let project = ProjectLayout::new("/work/app");
//! let config = RunConfig::default()
//!     .with_sdk(SdkConfig::from_home("/opt/gwt-2.7.0"))
//!     .with_mode("htmlunit")
//!     .with_htmlunit("FF17,IE9")
//!     .with_project(project.clone());
//!
//! let locator = InstallLocator::from_config(&config.support);
//! let launcher = ProcessLauncher::new();
//! let report = TestRun::new(&config, &project, &DirectoryScanner, &locator, &launcher).execute();
//! println!("{} executed, {} failed", report.summary.executed, report.summary.failed);
//! ```

mod args;
mod classpath;
pub mod cli;
mod config;
mod discovery;
mod error;
mod launcher;
mod project;
mod runner;

pub use args::{compile, prepare_output_dir, quote, split_args, unquote, BooleanFlag, RunStyle, BOOLEAN_FLAGS};
pub use classpath::{
    assemble, normalize_location, sdk_jars, Classpath, FixedLocator, InstallLocator,
    SupportComponent, SupportLocator,
};
pub use config::{RunConfig, SdkConfig, SupportConfig, DEFAULT_MAIN_CLASS};
pub use discovery::{
    discover, discover_project, AntPattern, DirectoryScanner, PatternMatcher, TestUnit,
};
pub use error::{ConfigError, HarnessError, HarnessResult};
pub use launcher::{
    LaunchSpec, Launcher, LogLine, LogStream, ProcessLauncher, ProcessOutcome, UnitFailure,
};
pub use project::{absolute_path, ProjectContext, ProjectLayout};
pub use runner::{
    decide, RunError, RunReport, RunSummary, TestRun, Verdict, ARGS_PROPERTY, REPORTS_PROPERTY,
};
