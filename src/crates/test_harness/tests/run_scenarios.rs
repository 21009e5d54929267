#[path = "harness_support.rs"]
mod support;

use gwt_test_harness::{
    decide, DirectoryScanner, HarnessError, RunError, RunSummary, TestRun, Verdict,
    ARGS_PROPERTY, REPORTS_PROPERTY,
};
use proptest::prelude::*;
use gwt_test_harness::ProjectLayout;
use support::{relative_to_cwd, scratch_project, FailingLocator, Script, ScriptedLauncher};

const THREE_UNITS: [&str; 3] = [
    "com/acme/GwtTestAlpha.java",
    "com/acme/GwtTestBeta.java",
    "com/acme/client/GwtAllSuite.java",
];

#[test]
fn empty_discovery_passes_without_launching() {
    let project = scratch_project(&[]);
    let launcher = ScriptedLauncher::new();
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(report.passed());
    assert_eq!(report.summary, RunSummary { executed: 0, failed: 0 });
    assert!(launcher.launched().is_empty());
}

#[test]
fn all_units_succeed() {
    let project = scratch_project(&THREE_UNITS);
    let launcher = ScriptedLauncher::new();
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(matches!(
        report.verdict,
        Verdict::Passed {
            ignored_failures: false
        }
    ));
    assert_eq!(report.summary, RunSummary { executed: 3, failed: 0 });
    assert_eq!(
        launcher.launched_units(),
        vec![
            "com.acme.GwtTestAlpha",
            "com.acme.GwtTestBeta",
            "com.acme.client.GwtAllSuite"
        ]
    );
}

#[test]
fn timed_out_unit_fails_the_build() {
    let project = scratch_project(&THREE_UNITS);
    let launcher = ScriptedLauncher::new().with_script("com.acme.GwtTestBeta", Script::TimeOut);
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(matches!(report.verdict, Verdict::FailedBuild));
    assert_eq!(report.summary, RunSummary { executed: 3, failed: 1 });
    assert_eq!(launcher.launched().len(), 3, "a failed unit must not stop the run");

    let reports = project.root().join("target/surefire-reports");
    match report.into_result() {
        Err(err @ RunError::TestFailures { .. }) => {
            assert!(
                err.to_string().contains(&reports.display().to_string()),
                "message should name the reports directory: {err}"
            );
        }
        other => panic!("expected test failures, got {other:?}"),
    }
}

#[test]
fn ignored_failures_pass_with_warning() {
    let mut project = scratch_project(&THREE_UNITS);
    project.config.test_failure_ignore = true;
    let launcher = ScriptedLauncher::new().with_script("com.acme.GwtTestBeta", Script::TimeOut);
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(matches!(
        report.verdict,
        Verdict::Passed {
            ignored_failures: true
        }
    ));
    assert_eq!(report.summary, RunSummary { executed: 3, failed: 1 });
    assert!(report.into_result().is_ok());
}

#[test]
fn classpath_failure_aborts_remaining_units() {
    let project = scratch_project(&THREE_UNITS);
    let launcher = ScriptedLauncher::new();
    let locator = FailingLocator::new(project.locator(), 1);

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(matches!(
        report.verdict,
        Verdict::FailedHarness(HarnessError::SupportLocation { .. })
    ));
    assert_eq!(launcher.launched_units(), vec!["com.acme.GwtTestAlpha"]);
    assert_eq!(report.summary, RunSummary { executed: 1, failed: 0 });

    let err = report.into_result().unwrap_err();
    let cause = std::error::Error::source(&err).expect("harness cause is chained");
    assert!(cause.to_string().contains("runner jar vanished"));
}

#[test]
fn harness_failure_from_launcher_is_fatal() {
    let project = scratch_project(&THREE_UNITS);
    let launcher = ScriptedLauncher::new()
        .with_script("com.acme.GwtTestAlpha", Script::TimeOut)
        .with_script("com.acme.GwtTestBeta", Script::Break);
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(matches!(report.verdict, Verdict::FailedHarness(_)));
    assert_eq!(launcher.launched().len(), 2);
    assert_eq!(report.summary, RunSummary { executed: 1, failed: 1 });
}

#[test]
fn missing_sdk_is_a_harness_failure() {
    let mut project = scratch_project(&THREE_UNITS);
    project.config.sdk.home = Some(project.root().join("no-such-sdk"));
    let launcher = ScriptedLauncher::new();
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(matches!(
        report.verdict,
        Verdict::FailedHarness(HarnessError::MissingLibrary(_))
    ));
    assert!(launcher.launched().is_empty());
}

#[test]
fn skip_switches_bypass_discovery() {
    for spelling in 0..3 {
        let mut project = scratch_project(&THREE_UNITS);
        match spelling {
            0 => project.config.skip = true,
            1 => project.config.skip_tests = true,
            _ => project.config.skip_exec = true,
        }
        // An unusable SDK proves nothing past the skip check runs.
        project.config.sdk.home = None;
        let launcher = ScriptedLauncher::new();
        let locator = project.locator();

        let report = TestRun::new(
            &project.config,
            &project.layout,
            &DirectoryScanner,
            &locator,
            &launcher,
        )
        .execute();

        assert!(report.passed());
        assert_eq!(report.summary, RunSummary::default());
        assert!(launcher.launched().is_empty());
    }
}

#[test]
fn launch_spec_carries_reports_and_args_properties() {
    let mut project = scratch_project(&["GwtTestSolo.java"]);
    project.config.timeout = 5;
    let launcher = ScriptedLauncher::new();
    let locator = project.locator();

    TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    let spec = launcher.launched().pop().expect("one launch");
    let root = project.root();
    assert_eq!(
        spec.system_properties.get(REPORTS_PROPERTY),
        Some(&root.join("target/surefire-reports").display().to_string())
    );
    let args = spec.system_properties.get(ARGS_PROPERTY).expect("gwt.args");
    assert!(args.starts_with(&format!("-war {}", root.join("target/www-test").display())));
    assert_eq!(spec.main_class, gwt_test_harness::DEFAULT_MAIN_CLASS);
    assert_eq!(spec.program_args, vec!["GwtTestSolo"]);
    assert_eq!(spec.timeout, Some(std::time::Duration::from_secs(5)));
    assert_eq!(spec.working_directory.as_deref(), Some(root));
    assert!(root.join("target/www-test").is_dir(), "output directory is created before launch");
}

#[cfg(unix)]
#[test]
fn relative_project_root_still_yields_absolute_paths() {
    let mut project = scratch_project(&["GwtTestSolo.java"]);
    let relative_root = relative_to_cwd(project.root());
    assert!(relative_root.is_relative());
    project.layout = ProjectLayout::new(&relative_root);
    let launcher = ScriptedLauncher::new();
    let locator = project.locator();

    let report = TestRun::new(
        &project.config,
        &project.layout,
        &DirectoryScanner,
        &locator,
        &launcher,
    )
    .execute();

    assert!(report.passed(), "{:?}", report.verdict);
    assert!(report.reports_directory.is_absolute());
    let spec = launcher.launched().pop().expect("one launch");
    let reports = std::path::PathBuf::from(&spec.system_properties[REPORTS_PROPERTY]);
    assert!(reports.is_absolute(), "{}", reports.display());
    assert!(reports.ends_with("target/surefire-reports"));

    let args = gwt_test_harness::split_args(&spec.system_properties[ARGS_PROPERTY]);
    let war = std::path::PathBuf::from(&args[1]);
    assert_eq!(args[0], "-war");
    assert!(war.is_absolute(), "{}", war.display());
    assert_eq!(
        war.canonicalize().expect("output directory exists"),
        project.root().join("target/www-test").canonicalize().expect("canonical root")
    );
}

proptest! {
    #[test]
    fn failure_count_is_order_independent(outcomes in prop::collection::vec(any::<bool>(), 0..24)) {
        let names: Vec<String> = (0..outcomes.len()).map(|i| format!("GwtTest{i:02}.java")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let project = scratch_project(&refs);

        let mut launcher = ScriptedLauncher::new();
        for (i, failed) in outcomes.iter().enumerate() {
            if *failed {
                launcher = launcher.with_script(&format!("GwtTest{i:02}"), Script::TimeOut);
            }
        }
        let locator = project.locator();
        let report = TestRun::new(
            &project.config,
            &project.layout,
            &DirectoryScanner,
            &locator,
            &launcher,
        )
        .execute();

        let expected = outcomes.iter().filter(|failed| **failed).count();
        prop_assert_eq!(report.summary, RunSummary { executed: outcomes.len(), failed: expected });
    }

    #[test]
    fn decision_follows_failure_count(failed in 0usize..5, executed in 5usize..10, ignore in any::<bool>()) {
        let verdict = decide(RunSummary { executed, failed }, ignore);
        let expected = match (failed, ignore) {
            (0, _) => matches!(verdict, Verdict::Passed { ignored_failures: false }),
            (_, true) => matches!(verdict, Verdict::Passed { ignored_failures: true }),
            (_, false) => matches!(verdict, Verdict::FailedBuild),
        };
        prop_assert!(expected, "unexpected verdict {:?} for {} failed, ignore={}", verdict, failed, ignore);
    }
}
