#[path = "harness_support.rs"]
mod support;

use std::path::PathBuf;

use gwt_test_harness::{
    discover, discover_project, DirectoryScanner, HarnessError, ProjectLayout, RunConfig,
};
use support::touch;
use tempfile::TempDir;

fn tree(files: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for file in files {
        touch(&dir.path().join(file));
    }
    dir
}

fn names(units: &[gwt_test_harness::TestUnit]) -> Vec<&str> {
    units.iter().map(|unit| unit.qualified_name.as_str()).collect()
}

fn strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

#[test]
fn default_includes_select_tests_and_suites() {
    let dir = tree(&[
        "com/acme/GwtTestWidget.java",
        "com/acme/WidgetTest.java",
        "com/acme/client/GwtClientSuite.java",
        "com/acme/client/GwtTestHelper.txt",
        "GwtTestTop.java",
    ]);
    let config = RunConfig::default();

    let units = discover(&DirectoryScanner, dir.path(), &config.includes, &config.excludes)
        .expect("discovery");

    assert_eq!(
        names(&units),
        vec![
            "GwtTestTop",
            "com.acme.GwtTestWidget",
            "com.acme.client.GwtClientSuite",
        ]
    );
    assert_eq!(
        units[1].source_path,
        dir.path().join("com/acme/GwtTestWidget.java")
    );
}

#[test]
fn excludes_subtract_from_included_files() {
    let dir = tree(&[
        "com/acme/GwtTestWidget.java",
        "com/acme/slow/GwtTestUpload.java",
        "com/acme/slow/GwtTestDownload.java",
    ]);

    let units = discover(
        &DirectoryScanner,
        dir.path(),
        &strings(&["**/GwtTest*.java"]),
        &strings(&["**/slow/**", "**/GwtTestNotThere.java"]),
    )
    .expect("discovery");

    assert_eq!(names(&units), vec!["com.acme.GwtTestWidget"]);
}

#[test]
fn exclude_only_removes_included_files() {
    let dir = tree(&["com/acme/GwtTestWidget.java", "com/acme/Helper.java"]);

    let units = discover(
        &DirectoryScanner,
        dir.path(),
        &strings(&["**/GwtTest*.java"]),
        &strings(&["**/Helper.java"]),
    )
    .expect("discovery");

    assert_eq!(names(&units), vec!["com.acme.GwtTestWidget"]);
}

#[test]
fn discovery_is_stable_across_scans() {
    let dir = tree(&[
        "b/GwtTestB.java",
        "a/GwtTestA.java",
        "c/deep/er/GwtTestC.java",
    ]);
    let includes = strings(&["**/GwtTest*.java"]);

    let first = discover(&DirectoryScanner, dir.path(), &includes, &[]).expect("first scan");
    let second = discover(&DirectoryScanner, dir.path(), &includes, &[]).expect("second scan");

    assert_eq!(first, second);
    assert_eq!(names(&first), vec!["a.GwtTestA", "b.GwtTestB", "c.deep.er.GwtTestC"]);
}

#[test]
fn missing_root_yields_no_units() {
    let dir = TempDir::new().expect("temp dir");
    let units = discover(
        &DirectoryScanner,
        &dir.path().join("src/test/java"),
        &strings(&["**/*.java"]),
        &[],
    )
    .expect("discovery");
    assert!(units.is_empty());
}

#[test]
fn invalid_pattern_is_reported() {
    let dir = tree(&["GwtTestA.java"]);
    let err = discover(&DirectoryScanner, dir.path(), &strings(&["  "]), &[]).unwrap_err();
    assert!(matches!(err, HarnessError::Pattern { .. }), "{err:?}");
}

#[test]
fn project_roots_are_merged_and_deduplicated() {
    let dir = tree(&[
        "src/test/java/com/acme/GwtTestShared.java",
        "src/test/java/com/acme/GwtTestWidget.java",
        "src/it/java/com/acme/GwtTestShared.java",
        "src/it/java/com/acme/GwtTestEndToEnd.java",
    ]);
    let layout = ProjectLayout::new(dir.path())
        .with_test_source_roots([PathBuf::from("src/test/java"), PathBuf::from("src/it/java")]);

    let units = discover_project(&DirectoryScanner, &layout, &strings(&["**/GwtTest*.java"]), &[])
        .expect("discovery");

    assert_eq!(
        names(&units),
        vec![
            "com.acme.GwtTestEndToEnd",
            "com.acme.GwtTestShared",
            "com.acme.GwtTestWidget",
        ]
    );
    // The copy under src/it sorts first by path.
    assert_eq!(
        units[1].source_path,
        dir.path().join("src/it/java/com/acme/GwtTestShared.java")
    );
}
