use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::args::{compile, prepare_output_dir};
use crate::classpath::{assemble, SupportLocator};
use crate::config::RunConfig;
use crate::discovery::{discover_project, PatternMatcher, TestUnit};
use crate::error::{HarnessError, HarnessResult};
use crate::launcher::{LaunchSpec, Launcher, ProcessOutcome};
use crate::project::{absolute_path, ProjectContext};

/// System property carrying the absolute reports directory.
pub const REPORTS_PROPERTY: &str = "surefire.reports";
/// System property carrying the compiled toolchain flags.
pub const ARGS_PROPERTY: &str = "gwt.args";

/// Counters for a run. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub executed: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Count a finished unit. Harness failures are not units and are not counted.
    pub fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Success => self.executed += 1,
            ProcessOutcome::UnitFailure(_) => {
                self.executed += 1;
                self.failed += 1;
            }
            ProcessOutcome::HarnessFailure(_) => {}
        }
    }
}

/// Final decision for a run.
#[derive(Debug)]
pub enum Verdict {
    /// No failures, or failures demoted to a warning by `test_failure_ignore`.
    Passed { ignored_failures: bool },
    /// At least one unit failed.
    FailedBuild,
    /// The harness broke; remaining units were not attempted.
    FailedHarness(HarnessError),
}

/// Verdict plus the counters it was derived from.
#[derive(Debug)]
pub struct RunReport {
    pub verdict: Verdict,
    pub summary: RunSummary,
    pub reports_directory: PathBuf,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        matches!(self.verdict, Verdict::Passed { .. })
    }

    /// Collapse into a result suitable for a build tool exit status.
    pub fn into_result(self) -> Result<RunSummary, RunError> {
        match self.verdict {
            Verdict::Passed { .. } => Ok(self.summary),
            Verdict::FailedBuild => Err(RunError::TestFailures {
                failed: self.summary.failed,
                executed: self.summary.executed,
                reports_directory: self.reports_directory,
            }),
            Verdict::FailedHarness(err) => Err(RunError::Harness(err)),
        }
    }
}

/// A run that did not pass.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "there were test failures ({failed} of {executed}); please refer to {} for the individual test results",
        reports_directory.display()
    )]
    TestFailures {
        failed: usize,
        executed: usize,
        reports_directory: PathBuf,
    },
    #[error("failed to run GWT tests")]
    Harness(#[source] HarnessError),
}

/// Apply the decision policy to a finished run.
pub fn decide(summary: RunSummary, ignore_failures: bool) -> Verdict {
    if summary.failed == 0 {
        Verdict::Passed {
            ignored_failures: false,
        }
    } else if ignore_failures {
        Verdict::Passed {
            ignored_failures: true,
        }
    } else {
        Verdict::FailedBuild
    }
}

/// Drives discovery and one sequential launch per unit.
pub struct TestRun<'a> {
    config: &'a RunConfig,
    project: &'a dyn ProjectContext,
    matcher: &'a dyn PatternMatcher,
    locator: &'a dyn SupportLocator,
    launcher: &'a dyn Launcher,
}

impl<'a> TestRun<'a> {
    pub fn new(
        config: &'a RunConfig,
        project: &'a dyn ProjectContext,
        matcher: &'a dyn PatternMatcher,
        locator: &'a dyn SupportLocator,
        launcher: &'a dyn Launcher,
    ) -> Self {
        Self {
            config,
            project,
            matcher,
            locator,
            launcher,
        }
    }

    /// Run every discovered unit, one child process at a time.
    pub fn execute(&self) -> RunReport {
        let reports_directory = self.project.resolve(&self.config.reports_directory);
        let mut summary = RunSummary::default();

        if self.config.is_skipped() {
            info!("tests are skipped");
            return RunReport {
                verdict: Verdict::Passed {
                    ignored_failures: false,
                },
                summary,
                reports_directory,
            };
        }

        let reports_directory = match absolute_path(&reports_directory) {
            Ok(absolute) => absolute,
            Err(err) => {
                error!(error = %err, "cannot resolve the reports directory");
                return RunReport {
                    verdict: Verdict::FailedHarness(err),
                    summary,
                    reports_directory,
                };
            }
        };

        let verdict = match self.launch_all(&reports_directory, &mut summary) {
            Ok(()) => decide(summary, self.config.test_failure_ignore),
            Err(err) => {
                error!(error = %err, executed = summary.executed, "aborting test run");
                Verdict::FailedHarness(err)
            }
        };

        match &verdict {
            Verdict::Passed {
                ignored_failures: true,
            } => warn!(
                "There are test failures.\n\nPlease refer to {} for the individual test results.",
                reports_directory.display()
            ),
            Verdict::Passed { .. } => {
                info!(executed = summary.executed, "all tests passed");
            }
            Verdict::FailedBuild => error!(
                failed = summary.failed,
                executed = summary.executed,
                reports = %reports_directory.display(),
                "test run failed"
            ),
            Verdict::FailedHarness(_) => {}
        }

        RunReport {
            verdict,
            summary,
            reports_directory,
        }
    }

    fn launch_all(&self, reports_directory: &Path, summary: &mut RunSummary) -> HarnessResult<()> {
        let units = discover_project(
            self.matcher,
            self.project,
            &self.config.includes,
            &self.config.excludes,
        )?;
        info!(count = units.len(), "discovered test units");

        for unit in &units {
            let _span = info_span!("unit", name = %unit.qualified_name).entered();
            let spec = self.launch_spec(unit, reports_directory)?;
            info!("running {}", unit.qualified_name);
            let outcome = self.launcher.launch(&spec);
            match &outcome {
                ProcessOutcome::Success => debug!("unit passed"),
                ProcessOutcome::UnitFailure(failure) => warn!(%failure, "unit failed"),
                ProcessOutcome::HarnessFailure(_) => {}
            }
            summary.record(&outcome);
            if let ProcessOutcome::HarnessFailure(err) = outcome {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Assemble the launch spec for one unit, creating the output directory.
    pub fn launch_spec(&self, unit: &TestUnit, reports_directory: &Path) -> HarnessResult<LaunchSpec> {
        let out_dir = prepare_output_dir(self.config, self.project)?;
        let classpath = assemble(self.config, self.project, self.locator)?;
        let args = compile(self.config, &out_dir, self.project.base_dir());

        let mut spec = LaunchSpec::new(self.config.jvm.clone(), self.config.main_class.clone())
            .with_jvm_args(self.config.extra_jvm_args.iter().cloned())
            .with_classpath(classpath)
            .with_working_directory(self.project.base_dir())
            .with_timeout(self.config.unit_timeout())
            .with_arg(unit.qualified_name.clone());
        for (key, value) in &self.config.system_properties {
            spec = spec.with_system_property(key.clone(), value.clone());
        }
        for (key, value) in &self.config.env {
            spec = spec.with_env(key.clone(), value.clone());
        }
        Ok(spec
            .with_system_property(REPORTS_PROPERTY, reports_directory.display().to_string())
            .with_system_property(ARGS_PROPERTY, args))
    }
}
