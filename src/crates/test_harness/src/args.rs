//! Renders a [`RunConfig`] into the single flag string the child toolchain
//! reads from its `gwt.args` property.
//!
//! Rendering is a pure function of its inputs. Booleans always contribute one
//! of two tokens, optional strings only appear when non-blank, and numeric
//! options with a sentinel only appear when set.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{is_blank, RunConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::project::{absolute_path, ProjectContext};

/// Characters that force a value to be escaped and quoted.
const ESCAPED: [char; 5] = ['"', ' ', '\t', '\r', '\n'];
const QUOTE: char = '"';
const ESCAPE: char = '\\';

/// A boolean option and the two tokens it renders as.
#[derive(Clone, Copy)]
pub struct BooleanFlag {
    /// Configuration key of the option.
    pub option: &'static str,
    /// Token emitted when the option is set.
    pub when_set: &'static str,
    /// Token emitted when the option is not set.
    pub when_unset: &'static str,
    read: fn(&RunConfig) -> bool,
    write: fn(&mut RunConfig, bool),
}

impl BooleanFlag {
    pub fn is_set(&self, config: &RunConfig) -> bool {
        (self.read)(config)
    }

    pub fn set(&self, config: &mut RunConfig, value: bool) {
        (self.write)(config, value);
    }

    pub fn token(&self, config: &RunConfig) -> &'static str {
        if self.is_set(config) {
            self.when_set
        } else {
            self.when_unset
        }
    }
}

/// Every paired boolean flag, in emission order.
pub static BOOLEAN_FLAGS: [BooleanFlag; 13] = [
    BooleanFlag {
        option: "production_mode",
        when_set: "-nodevMode",
        when_unset: "-devMode",
        read: RunConfig::production,
        write: |config, value| {
            config.production_mode = value;
            config.web_mode = false;
        },
    },
    BooleanFlag {
        option: "check_assertions",
        when_set: "-checkAssertions",
        when_unset: "-nocheckAssertions",
        read: |config| config.check_assertions,
        write: |config, value| config.check_assertions = value,
    },
    BooleanFlag {
        option: "cluster_functions",
        when_set: "-XclusterFunctions",
        when_unset: "-XnoclusterFunctions",
        read: |config| config.cluster_functions,
        write: |config, value| config.cluster_functions = value,
    },
    BooleanFlag {
        option: "disable_cast_checking",
        when_set: "-XnocheckCasts",
        when_unset: "-XcheckCasts",
        read: |config| config.disable_cast_checking,
        write: |config, value| config.disable_cast_checking = value,
    },
    BooleanFlag {
        option: "disable_class_metadata",
        when_set: "-XnoclassMetadata",
        when_unset: "-XclassMetadata",
        read: |config| config.disable_class_metadata,
        write: |config, value| config.disable_class_metadata = value,
    },
    BooleanFlag {
        option: "disable_run_async",
        when_set: "-XnocodeSplitting",
        when_unset: "-XcodeSplitting",
        read: |config| config.disable_run_async,
        write: |config, value| config.disable_run_async = value,
    },
    BooleanFlag {
        option: "draft_compile",
        when_set: "-draftCompile",
        when_unset: "-nodraftCompile",
        read: |config| config.draft_compile,
        write: |config, value| config.draft_compile = value,
    },
    BooleanFlag {
        option: "inline_literal_parameters",
        when_set: "-XinlineLiteralParameters",
        when_unset: "-XnoinlineLiteralParameters",
        read: |config| config.inline_literal_parameters,
        write: |config, value| config.inline_literal_parameters = value,
    },
    BooleanFlag {
        option: "optimize_dataflow",
        when_set: "-XoptimizeDataflow",
        when_unset: "-XnooptimizeDataflow",
        read: |config| config.optimize_dataflow,
        write: |config, value| config.optimize_dataflow = value,
    },
    BooleanFlag {
        option: "ordinalize_enums",
        when_set: "-XordinalizeEnums",
        when_unset: "-XnoordinalizeEnums",
        read: |config| config.ordinalize_enums,
        write: |config, value| config.ordinalize_enums = value,
    },
    BooleanFlag {
        option: "remove_duplicate_functions",
        when_set: "-XremoveDuplicateFunctions",
        when_unset: "-XnoremoveDuplicateFunctions",
        read: |config| config.remove_duplicate_functions,
        write: |config, value| config.remove_duplicate_functions = value,
    },
    BooleanFlag {
        option: "show_ui",
        when_set: "-showUi",
        when_unset: "-noshowUi",
        read: |config| config.show_ui,
        write: |config, value| config.show_ui = value,
    },
    BooleanFlag {
        option: "incremental",
        when_set: "-incremental",
        when_unset: "-noincremental",
        read: |config| config.incremental,
        write: |config, value| config.incremental = value,
    },
];

/// Execution backend selected by the `mode` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStyle {
    /// Browsers connect by hand; one client is awaited.
    Manual,
    /// Emulated browsers, e.g. `FF17,IE9`.
    HtmlUnit(String),
    /// Selenium remote control target.
    Selenium(String),
    /// Any other style name, passed through untouched.
    Custom(String),
}

impl RunStyle {
    /// Map the configured mode; a blank mode selects no style.
    pub fn from_config(config: &RunConfig) -> Option<Self> {
        let mode = config.mode.trim();
        if mode.eq_ignore_ascii_case("manual") {
            Some(RunStyle::Manual)
        } else if mode.eq_ignore_ascii_case("htmlunit") {
            Some(RunStyle::HtmlUnit(config.htmlunit.clone()))
        } else if mode.eq_ignore_ascii_case("selenium") {
            Some(RunStyle::Selenium(
                config.selenium.clone().unwrap_or_default(),
            ))
        } else if mode.is_empty() {
            None
        } else {
            Some(RunStyle::Custom(config.mode.clone()))
        }
    }

    /// Value of the `-runStyle` flag.
    pub fn descriptor(&self) -> String {
        match self {
            RunStyle::Manual => "Manual:1".to_string(),
            RunStyle::HtmlUnit(browsers) => format!("HtmlUnit:{browsers}"),
            RunStyle::Selenium(target) => format!("Selenium:{target}"),
            RunStyle::Custom(name) => name.clone(),
        }
    }
}

/// Render the full flag string for one child invocation.
///
/// `out_dir` is the resolved output directory; relative `work_dir` and
/// `log_dir` are resolved against `base_dir`.
pub fn compile(config: &RunConfig, out_dir: &Path, base_dir: &Path) -> String {
    let mut line = ArgLine::default();

    line.value("-war", &out_dir.display().to_string());
    line.value("-logLevel", &config.log_level);
    for flag in &BOOLEAN_FLAGS {
        line.token(flag.token(config));
    }
    line.optional("-sourceLevel", config.source_level.as_deref());
    line.number("-testBeginTimeout", config.test_begin_timeout);
    line.number("-testMethodTimeout", config.test_method_timeout);
    line.number("-Xtries", config.tries);
    if config.optimization_level >= 0 {
        line.number("-optimize", config.optimization_level);
    }
    line.optional("-precompile", config.precompile.as_deref());
    line.optional("-logdir", absolute(config.log_dir.as_deref(), base_dir).as_deref());
    line.optional("-workDir", absolute(config.work_dir.as_deref(), base_dir).as_deref());
    line.optional("-Xnamespace", config.namespace.as_deref());
    line.optional("-XjsInteropMode", config.js_interop_mode.as_deref());
    if let Some(style) = RunStyle::from_config(config) {
        line.value("-runStyle", &style.descriptor());
    }
    line.optional("-userAgents", config.user_agents.as_deref());
    line.optional("-batch", config.batch.as_deref());

    line.0
}

/// Create the output directory, resolving a relative `out` against the project root.
///
/// The returned path is absolute even when the project root is relative.
pub fn prepare_output_dir(
    config: &RunConfig,
    project: &dyn ProjectContext,
) -> HarnessResult<PathBuf> {
    let out_dir = absolute_path(&project.resolve(&config.out))?;
    fs::create_dir_all(&out_dir).map_err(|source| HarnessError::OutputDirectory {
        path: out_dir.clone(),
        source,
    })?;
    Ok(out_dir)
}

fn absolute(path: Option<&Path>, base_dir: &Path) -> Option<String> {
    let path = path.filter(|path| !path.as_os_str().is_empty())?;
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    Some(resolved.display().to_string())
}

#[derive(Default)]
struct ArgLine(String);

impl ArgLine {
    fn token(&mut self, token: &str) {
        if !self.0.is_empty() {
            self.0.push(' ');
        }
        self.0.push_str(token);
    }

    fn value(&mut self, flag: &str, value: &str) {
        self.token(flag);
        self.token(&quote(value));
    }

    fn number(&mut self, flag: &str, value: impl Display) {
        self.token(flag);
        self.token(&value.to_string());
    }

    fn optional(&mut self, flag: &str, value: Option<&str>) {
        if let (false, Some(value)) = (is_blank(value), value) {
            self.value(flag, value);
        }
    }
}

/// Quote a value so it survives as a single token.
///
/// Each `"`, space, tab, CR and LF is prefixed with `\`; if anything was
/// escaped the result is wrapped in double quotes. A value ending in `\` is
/// quoted as well. Inside quotes every `\` is doubled so it cannot pair with
/// the closing quote. Other values pass through.
pub fn quote(value: &str) -> String {
    if !value.contains(&ESCAPED[..]) && !value.ends_with(ESCAPE) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 8);
    quoted.push(QUOTE);
    for c in value.chars() {
        if is_escapable(c, true) {
            quoted.push(ESCAPE);
        }
        quoted.push(c);
    }
    quoted.push(QUOTE);
    quoted
}

/// Characters a `\` escapes. A doubled `\` only collapses inside quotes, so
/// unquoted Windows paths keep their separators.
fn is_escapable(c: char, quoted: bool) -> bool {
    ESCAPED.contains(&c) || (quoted && c == ESCAPE)
}

/// Inverse of [`quote`] for a single token.
pub fn unquote(token: &str) -> String {
    let (inner, quoted) = match token
        .strip_prefix(QUOTE)
        .and_then(|rest| rest.strip_suffix(QUOTE))
    {
        Some(inner) => (inner, true),
        None => (token, false),
    };
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let Some(next) = chars.next_if(|&next| is_escapable(next, quoted)) {
                value.push(next);
                continue;
            }
        }
        value.push(c);
    }
    value
}

/// Split a compiled flag string back into unquoted tokens.
pub fn split_args(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE if chars.peek().is_some_and(|&next| is_escapable(next, quoted)) => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            QUOTE => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_not_quoted() {
        assert_eq!(quote("FF17,IE9"), "FF17,IE9");
        assert_eq!(quote("C:\\work"), "C:\\work");
    }

    #[test]
    fn specials_are_escaped_and_quoted() {
        assert_eq!(quote("a b"), "\"a\\ b\"");
        assert_eq!(quote("say \"hi\""), "\"say\\ \\\"hi\\\"\"");
        assert_eq!(quote("tab\there"), "\"tab\\\there\"");
    }

    #[test]
    fn unquote_reverses_quote() {
        for value in ["a b", "say \"hi\"", "line\nbreak", "\\\"", "trailing\\", "\"wrapped\"", "\\\\share\\"] {
            assert_eq!(unquote(&quote(value)), value, "value {value:?}");
        }
    }

    #[test]
    fn trailing_backslash_does_not_swallow_the_next_flag() {
        assert_eq!(quote("1.8\\"), "\"1.8\\\\\"");
        let line = format!("-sourceLevel {} -testBeginTimeout 1", quote("1.8\\"));
        assert_eq!(
            split_args(&line),
            vec!["-sourceLevel", "1.8\\", "-testBeginTimeout", "1"]
        );
        let path = format!("-war {}", quote("C:\\my dir\\"));
        assert_eq!(split_args(&path), vec!["-war", "C:\\my dir\\"]);
    }

    #[test]
    fn split_args_honors_quotes() {
        let line = format!("-war {} -batch module", quote("/tmp/my out"));
        assert_eq!(split_args(&line), vec!["-war", "/tmp/my out", "-batch", "module"]);
    }

    #[test]
    fn blank_mode_has_no_style() {
        let config = RunConfig::default().with_mode("  ");
        assert_eq!(RunStyle::from_config(&config), None);
    }

    #[test]
    fn mode_is_case_insensitive() {
        let config = RunConfig::default().with_mode("HtmlUnit").with_htmlunit("IE9");
        assert_eq!(
            RunStyle::from_config(&config),
            Some(RunStyle::HtmlUnit("IE9".to_string()))
        );
        let custom = RunConfig::default().with_mode("RemoteWeb:rmi://host/ff");
        assert_eq!(
            RunStyle::from_config(&custom).map(|style| style.descriptor()),
            Some("RemoteWeb:rmi://host/ff".to_string())
        );
    }
}
