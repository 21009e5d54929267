use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{HarnessError, HarnessResult};
use crate::project::ProjectContext;

/// One discovered test source and the name the child process runs it under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestUnit {
    pub qualified_name: String,
    pub source_path: PathBuf,
}

impl TestUnit {
    /// Build a unit from a file found under `root`; `relative` is its path below `root`.
    ///
    /// The file extension is dropped and directory separators become `.`,
    /// so `com/acme/GwtTestFoo.java` runs as `com.acme.GwtTestFoo`.
    pub fn from_relative(root: &Path, relative: &Path) -> Self {
        let mut parts: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if let (Some(last), Some(stem)) = (parts.last_mut(), relative.file_stem()) {
            *last = stem.to_string_lossy().into_owned();
        }
        Self {
            qualified_name: parts.join("."),
            source_path: root.join(relative),
        }
    }
}

/// Capability that lists files under a root selected by include/exclude patterns.
pub trait PatternMatcher {
    /// Return matching paths relative to `root`.
    fn matching_files(
        &self,
        root: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> HarnessResult<Vec<PathBuf>>;
}

/// Walks the filesystem and applies ant-style patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryScanner;

impl PatternMatcher for DirectoryScanner {
    fn matching_files(
        &self,
        root: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> HarnessResult<Vec<PathBuf>> {
        let includes = AntPattern::parse_all(includes)?;
        let excludes = AntPattern::parse_all(excludes)?;

        if !root.is_dir() {
            debug!(root = %root.display(), "test source root does not exist");
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|source| HarnessError::Scan {
                path: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let normalized = slash_path(relative);
            let included = includes.iter().any(|pattern| pattern.matches(&normalized));
            if included && !excludes.iter().any(|pattern| pattern.matches(&normalized)) {
                matches.push(relative.to_path_buf());
            }
        }
        Ok(matches)
    }
}

/// Discover the test units below a single source root, sorted by qualified name.
pub fn discover(
    matcher: &dyn PatternMatcher,
    root: &Path,
    includes: &[String],
    excludes: &[String],
) -> HarnessResult<Vec<TestUnit>> {
    let mut units: Vec<TestUnit> = matcher
        .matching_files(root, includes, excludes)?
        .iter()
        .map(|relative| TestUnit::from_relative(root, relative))
        .collect();
    units.sort();
    Ok(units)
}

/// Discover test units across every test source root of a project.
///
/// A class reachable from two roots is only run once, from the first root
/// in lexical order of its source path.
pub fn discover_project(
    matcher: &dyn PatternMatcher,
    project: &dyn ProjectContext,
    includes: &[String],
    excludes: &[String],
) -> HarnessResult<Vec<TestUnit>> {
    let mut units = Vec::new();
    for root in project.test_source_roots() {
        let found = discover(matcher, &root, includes, excludes)?;
        debug!(root = %root.display(), count = found.len(), "scanned test source root");
        units.extend(found);
    }
    units.sort();
    units.dedup_by(|next, kept| next.qualified_name == kept.qualified_name);
    Ok(units)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: zero or more whole path segments.
    AnyDepth,
    /// A single segment that may contain `*` and `?`.
    Glob(Vec<char>),
}

/// Ant-style glob: `*` and `?` match within a segment, `**` spans segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl AntPattern {
    pub fn parse(pattern: &str) -> HarnessResult<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(HarnessError::pattern(pattern, "pattern is empty"));
        }
        let mut normalized = trimmed.replace('\\', "/");
        // A trailing separator selects everything beneath the directory.
        if normalized.ends_with('/') {
            normalized.push_str("**");
        }

        let mut segments: Vec<Segment> = Vec::new();
        for part in normalized.split('/').filter(|part| !part.is_empty()) {
            if part == "**" {
                if segments.last() != Some(&Segment::AnyDepth) {
                    segments.push(Segment::AnyDepth);
                }
            } else {
                segments.push(Segment::Glob(part.chars().collect()));
            }
        }
        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    fn parse_all(patterns: &[String]) -> HarnessResult<Vec<Self>> {
        patterns.iter().map(|pattern| Self::parse(pattern)).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a `/`-separated path relative to the scan root.
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((Segment::Glob(glob), rest)) => match path.split_first() {
            Some((head, tail)) => {
                let text: Vec<char> = head.chars().collect();
                wildcard_match(glob, &text) && match_segments(rest, tail)
            }
            None => false,
        },
    }
}

fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
