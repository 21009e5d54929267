use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::project::ProjectLayout;

/// Maximum accepted size of a configuration file in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 512 * 1024;

/// Main class started in every forked process.
pub const DEFAULT_MAIN_CLASS: &str = "org.codehaus.mojo.gwt.test.MavenTestRunner";

/// Immutable snapshot of every option that shapes a test run.
///
/// Every field has a default, so a partially specified TOML file (or none at
/// all) still yields a complete configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Bypass the run entirely.
    pub skip: bool,
    /// Same as `skip`, kept for operators used to the surefire spelling.
    pub skip_tests: bool,
    /// Deprecated spelling of `skip_tests`.
    pub skip_exec: bool,
    /// Report failed units as a warning instead of failing the build.
    pub test_failure_ignore: bool,
    /// Ant-style patterns selecting test sources.
    #[serde(deserialize_with = "lenient::patterns")]
    pub includes: Vec<String>,
    /// Ant-style patterns removed from the included set.
    #[serde(deserialize_with = "lenient::patterns")]
    pub excludes: Vec<String>,
    /// Output directory for code generated while running tests.
    pub out: PathBuf,
    /// Destination for per-unit result artifacts.
    pub reports_directory: PathBuf,
    /// Run style: `manual`, `htmlunit`, `selenium`, or a custom style name.
    pub mode: String,
    /// Browser emulations for the `htmlunit` mode, comma separated.
    pub htmlunit: String,
    /// Remote control target for the `selenium` mode.
    #[serde(deserialize_with = "lenient::opt_string")]
    pub selenium: Option<String>,
    /// User agents to compile for, comma separated.
    #[serde(deserialize_with = "lenient::opt_string")]
    pub user_agents: Option<String>,
    /// Batch execution strategy: `none`, `class` or `module`.
    #[serde(deserialize_with = "lenient::opt_string")]
    pub batch: Option<String>,
    /// Toolchain log level, e.g. `INFO` or `DEBUG`.
    pub log_level: String,
    /// Run in production mode rather than development mode.
    pub production_mode: bool,
    /// Deprecated alias of `production_mode`.
    pub web_mode: bool,
    pub show_ui: bool,
    pub check_assertions: bool,
    pub disable_class_metadata: bool,
    pub disable_cast_checking: bool,
    pub disable_run_async: bool,
    pub draft_compile: bool,
    pub cluster_functions: bool,
    pub inline_literal_parameters: bool,
    pub optimize_dataflow: bool,
    pub ordinalize_enums: bool,
    pub remove_duplicate_functions: bool,
    pub incremental: bool,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub source_level: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub namespace: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub js_interop_mode: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub precompile: Option<String>,
    /// Compiler optimization level, 0 to 9. Negative values defer to the compiler.
    pub optimization_level: i32,
    /// Per test method timeout, in minutes.
    pub test_method_timeout: u32,
    /// Time for clients to contact the server, in minutes.
    pub test_begin_timeout: u32,
    /// Maximum attempts per test method, honored by the child.
    pub tries: u32,
    /// Wall-clock limit for one forked process, in seconds. Zero disables it.
    pub timeout: u64,
    /// Put the SDK jars ahead of the project classpath.
    pub sdk_first: bool,
    /// Executable used to start the child process.
    pub jvm: String,
    /// Arguments placed before the system properties, e.g. `-Xmx512m`.
    pub extra_jvm_args: Vec<String>,
    /// Entry point started in every child.
    pub main_class: String,
    /// Additional `-D` properties handed to every child.
    pub system_properties: BTreeMap<String, String>,
    /// Additional environment variables applied to every child.
    pub env: BTreeMap<String, String>,
    pub sdk: SdkConfig,
    pub support: SupportConfig,
    /// Project layout, read from the `[project]` table.
    pub project: ProjectLayout,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            skip: false,
            skip_tests: false,
            skip_exec: false,
            test_failure_ignore: false,
            includes: vec![
                "**/GwtTest*.java".to_string(),
                "**/Gwt*Suite.java".to_string(),
            ],
            excludes: Vec::new(),
            out: PathBuf::from("target/www-test"),
            reports_directory: PathBuf::from("target/surefire-reports"),
            mode: "manual".to_string(),
            htmlunit: "FF17".to_string(),
            selenium: None,
            user_agents: None,
            batch: None,
            log_level: "INFO".to_string(),
            production_mode: false,
            web_mode: false,
            show_ui: false,
            check_assertions: false,
            disable_class_metadata: false,
            disable_cast_checking: false,
            disable_run_async: false,
            draft_compile: false,
            cluster_functions: true,
            inline_literal_parameters: true,
            optimize_dataflow: true,
            ordinalize_enums: true,
            remove_duplicate_functions: true,
            incremental: false,
            source_level: None,
            work_dir: None,
            log_dir: None,
            namespace: None,
            js_interop_mode: Some("NONE".to_string()),
            precompile: Some("simple".to_string()),
            optimization_level: -1,
            test_method_timeout: 5,
            test_begin_timeout: 1,
            tries: 1,
            timeout: 60,
            sdk_first: false,
            jvm: "java".to_string(),
            extra_jvm_args: vec!["-Xmx512m".to_string()],
            main_class: DEFAULT_MAIN_CLASS.to_string(),
            system_properties: BTreeMap::new(),
            env: BTreeMap::new(),
            sdk: SdkConfig::default(),
            support: SupportConfig::default(),
            project: ProjectLayout::default(),
        }
    }
}

impl RunConfig {
    /// Load a configuration file (if any) and overlay `KEY=VALUE` overrides.
    ///
    /// Keys may be dotted (`sdk.home=/opt/gwt`). Values that look like TOML
    /// booleans, integers or arrays are parsed as such; anything else is taken
    /// as a plain string.
    ///
    /// The result is not validated; callers layering further settings on top
    /// call [`RunConfig::validate`] once they are done.
    pub fn load(path: Option<&Path>, overrides: &[String]) -> Result<Self, ConfigError> {
        let mut table = match path {
            Some(path) => read_table(path)?,
            None => toml::Table::new(),
        };
        for raw in overrides {
            apply_override(&mut table, raw)?;
        }
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Reject option combinations the child toolchain cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jvm.trim().is_empty() {
            return Err(ConfigError::Invalid("jvm must not be blank".to_string()));
        }
        if self.main_class.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "main_class must not be blank".to_string(),
            ));
        }
        if self.out.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("out must not be empty".to_string()));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "log_level must not be blank".to_string(),
            ));
        }
        if self.optimization_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "optimization_level must be between 0 and 9 (or negative for the default), got {}",
                self.optimization_level
            )));
        }
        if self.mode.trim().eq_ignore_ascii_case("selenium") && is_blank(self.selenium.as_deref()) {
            return Err(ConfigError::Invalid(
                "selenium mode requires the selenium target".to_string(),
            ));
        }
        if self
            .includes
            .iter()
            .chain(&self.excludes)
            .any(|pattern| pattern.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "include/exclude patterns must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// True when any of the three skip switches is set.
    pub fn is_skipped(&self) -> bool {
        self.skip || self.skip_tests || self.skip_exec
    }

    /// True when the child should run in production (web) mode.
    pub fn production(&self) -> bool {
        self.production_mode || self.web_mode
    }

    /// Per-unit wall-clock limit, if any.
    pub fn unit_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    /// Replace the include patterns.
    pub fn with_includes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the exclude patterns.
    pub fn with_excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Select the run style.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Browser emulations used by the `htmlunit` mode.
    pub fn with_htmlunit(mut self, browsers: impl Into<String>) -> Self {
        self.htmlunit = browsers.into();
        self
    }

    /// Remote target used by the `selenium` mode.
    pub fn with_selenium(mut self, target: impl Into<String>) -> Self {
        self.selenium = Some(target.into());
        self
    }

    /// Demote unit failures to a warning.
    pub fn with_test_failure_ignore(mut self, ignore: bool) -> Self {
        self.test_failure_ignore = ignore;
        self
    }

    /// Bypass the run entirely.
    pub fn with_skip_tests(mut self, skip: bool) -> Self {
        self.skip_tests = skip;
        self
    }

    /// Output directory for generated code, relative to the project root unless absolute.
    pub fn with_out(mut self, out: impl Into<PathBuf>) -> Self {
        self.out = out.into();
        self
    }

    /// Directory receiving per-unit reports.
    pub fn with_reports_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_directory = dir.into();
        self
    }

    /// Override the per-unit timeout in seconds (zero disables it).
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Put the SDK jars ahead of the project test classpath.
    pub fn with_sdk_first(mut self, first: bool) -> Self {
        self.sdk_first = first;
        self
    }

    /// Use a different executable for the child process.
    pub fn with_jvm(mut self, jvm: impl Into<String>) -> Self {
        self.jvm = jvm.into();
        self
    }

    /// Replace the extra arguments placed before the classpath.
    pub fn with_extra_jvm_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_jvm_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add a `-D` property handed to every child.
    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    /// Add an environment variable applied to every child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set where the SDK jars are found.
    pub fn with_sdk(mut self, sdk: SdkConfig) -> Self {
        self.sdk = sdk;
        self
    }

    /// Set where the runner and reporter libraries are found.
    pub fn with_support(mut self, support: SupportConfig) -> Self {
        self.support = support;
        self
    }

    /// Set the project layout used by the CLI.
    pub fn with_project(mut self, project: ProjectLayout) -> Self {
        self.project = project;
        self
    }
}

/// Location of the toolchain jars injected into every child classpath.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SdkConfig {
    /// SDK installation directory containing `gwt-user.jar` and `gwt-dev.jar`.
    pub home: Option<PathBuf>,
    /// Explicit user library, overrides `home`.
    pub user_jar: Option<PathBuf>,
    /// Explicit dev library, overrides `home`.
    pub dev_jar: Option<PathBuf>,
}

impl SdkConfig {
    /// Point at an SDK installation directory.
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            ..Self::default()
        }
    }
}

/// Where the runner and reporter support libraries live on disk.
///
/// Values may be plain paths or `file:` / `jar:file:...!/...` URLs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupportConfig {
    pub runner: Option<String>,
    pub reporter: Option<String>,
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let read_err = |source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    };
    let len = fs::metadata(path).map_err(read_err)?.len();
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(read_err)?;
    let content =
        String::from_utf8(bytes).map_err(|_| ConfigError::Encoding(path.to_path_buf()))?;
    Ok(toml::from_str(&content)?)
}

fn apply_override(table: &mut toml::Table, raw: &str) -> Result<(), ConfigError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::Override(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(ConfigError::Override(raw.to_string()));
    }

    let mut segments: Vec<&str> = key.split('.').collect();
    let leaf = segments.pop().unwrap_or(key);
    let mut current = table;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = match entry {
            toml::Value::Table(inner) => inner,
            _ => return Err(ConfigError::Override(raw.to_string())),
        };
    }
    current.insert(leaf.to_string(), override_value(value.trim()));
    Ok(())
}

fn override_value(raw: &str) -> toml::Value {
    let looks_typed = raw == "true"
        || raw == "false"
        || raw.starts_with('[')
        || raw.parse::<i64>().is_ok();
    if looks_typed {
        if let Ok(mut parsed) = toml::from_str::<toml::Table>(&format!("value = {raw}")) {
            if let Some(value) = parsed.remove("value") {
                return value;
            }
        }
    }
    toml::Value::String(raw.to_string())
}

/// Deserializers tolerant of the loose typing of command-line overrides.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Patterns {
        Joined(String),
        List(Vec<String>),
    }

    pub(super) fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
                Scalar::Text(text) => text,
                Scalar::Int(value) => value.to_string(),
            }),
        )
    }

    /// Accept either a list or a single comma separated string.
    pub(super) fn patterns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let patterns = match Patterns::deserialize(deserializer)? {
            Patterns::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|pattern| !pattern.is_empty())
                .map(str::to_string)
                .collect(),
            Patterns::List(list) => list,
        };
        Ok(patterns)
    }
}
