use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::config::{RunConfig, SdkConfig, SupportConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::project::ProjectContext;

/// Ordered child classpath. The first entry providing a class wins, and an
/// entry is only kept at its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    entries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry unless it is already present.
    pub fn push(&mut self, entry: impl Into<PathBuf>) {
        let entry = entry.into();
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn extend<I, P>(&mut self, entries: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Join entries with the platform path separator.
    pub fn to_os_string(&self) -> HarnessResult<OsString> {
        env::join_paths(&self.entries)
            .map_err(|err| HarnessError::config(format!("unrepresentable classpath entry: {err}")))
    }
}

/// Support libraries the child calls back into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportComponent {
    /// Runtime of the test runner started as the child's main class.
    Runner,
    /// Result reporting support writing the shared report format.
    Reporter,
}

impl SupportComponent {
    pub fn name(self) -> &'static str {
        match self {
            SupportComponent::Runner => "runner",
            SupportComponent::Reporter => "reporter",
        }
    }

    /// File name used by the installation layout.
    pub fn jar_name(self) -> &'static str {
        match self {
            SupportComponent::Runner => "gwt-test-runner.jar",
            SupportComponent::Reporter => "surefire-reporter.jar",
        }
    }
}

impl fmt::Display for SupportComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves where a support library lives on disk.
pub trait SupportLocator {
    fn locate(&self, component: SupportComponent) -> HarnessResult<PathBuf>;
}

/// Looks up support libraries from explicit configuration, falling back to
/// the `lib/` directory next to the installed binary (`<prefix>/bin/gwt-test`
/// alongside `<prefix>/lib/*.jar`).
#[derive(Debug, Clone, Default)]
pub struct InstallLocator {
    configured: SupportConfig,
    lib_dir: Option<PathBuf>,
}

impl InstallLocator {
    /// Use the configured locations and the installation layout of the running executable.
    pub fn from_config(support: &SupportConfig) -> Self {
        let lib_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|bin| bin.join("..").join("lib")));
        Self {
            configured: support.clone(),
            lib_dir,
        }
    }

    /// Override the installation library directory.
    pub fn with_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_dir = Some(dir.into());
        self
    }
}

impl SupportLocator for InstallLocator {
    fn locate(&self, component: SupportComponent) -> HarnessResult<PathBuf> {
        let configured = match component {
            SupportComponent::Runner => self.configured.runner.as_deref(),
            SupportComponent::Reporter => self.configured.reporter.as_deref(),
        };
        let path = match configured {
            Some(raw) => normalize_location(raw).map_err(|reason| {
                HarnessError::SupportLocation {
                    component: component.name(),
                    reason,
                }
            })?,
            None => self
                .lib_dir
                .as_ref()
                .map(|dir| dir.join(component.jar_name()))
                .ok_or_else(|| HarnessError::SupportLocation {
                    component: component.name(),
                    reason: "no configured location and no installation directory".to_string(),
                })?,
        };

        if !path.exists() {
            return Err(HarnessError::SupportLocation {
                component: component.name(),
                reason: format!("{} does not exist", path.display()),
            });
        }
        debug!(%component, path = %path.display(), "located support library");
        Ok(path)
    }
}

/// Turn a location written as a path, a `file:` URL or a `jar:file:...!/entry`
/// URL into a filesystem path. `%20` is decoded to a space.
pub fn normalize_location(raw: &str) -> Result<PathBuf, String> {
    let mut location = raw.trim();
    if location.is_empty() {
        return Err("location is blank".to_string());
    }

    if let Some(rest) = location.strip_prefix("jar:") {
        let bang = rest
            .find('!')
            .ok_or_else(|| format!("`{raw}` has no `!` separating the archive from its entry"))?;
        location = &rest[..bang];
    }

    let decoded = match location.strip_prefix("file:") {
        Some(rest) => {
            let rest = match rest.strip_prefix("//") {
                Some(after_authority) if after_authority.starts_with('/') => after_authority,
                _ => rest,
            };
            rest.replace("%20", " ")
        }
        None => location.to_string(),
    };

    if decoded.is_empty() {
        return Err(format!("`{raw}` does not name a path"));
    }
    Ok(PathBuf::from(decoded))
}

/// Resolve the SDK user and dev libraries, in that order.
pub fn sdk_jars(sdk: &SdkConfig, project: &dyn ProjectContext) -> HarnessResult<[PathBuf; 2]> {
    let from_home = |name: &str| sdk.home.as_ref().map(|home| home.join(name));
    let user = sdk.user_jar.clone().or_else(|| from_home("gwt-user.jar"));
    let dev = sdk.dev_jar.clone().or_else(|| from_home("gwt-dev.jar"));

    let (Some(user), Some(dev)) = (user, dev) else {
        return Err(HarnessError::config(
            "sdk.home (or both sdk.user_jar and sdk.dev_jar) must be set",
        ));
    };

    let jars = [project.resolve(&user), project.resolve(&dev)];
    for jar in &jars {
        if !jar.is_file() {
            return Err(HarnessError::MissingLibrary(jar.clone()));
        }
    }
    Ok(jars)
}

/// Build the child classpath.
///
/// The SDK jars go before or after the project test classpath depending on
/// `sdk_first`; main source roots and the support libraries follow.
pub fn assemble(
    config: &RunConfig,
    project: &dyn ProjectContext,
    locator: &dyn SupportLocator,
) -> HarnessResult<Classpath> {
    let sdk = sdk_jars(&config.sdk, project)?;
    let mut classpath = Classpath::new();

    if config.sdk_first {
        classpath.extend(sdk.iter().cloned());
    }
    classpath.extend(project.test_classpath());
    if !config.sdk_first {
        classpath.extend(sdk.iter().cloned());
    }
    classpath.extend(project.compile_source_roots());

    for component in [SupportComponent::Runner, SupportComponent::Reporter] {
        let path = locator.locate(component)?;
        classpath.push(project.resolve(&path));
    }

    debug!(entries = classpath.entries().len(), "assembled classpath");
    Ok(classpath)
}

/// Fixed support locations, useful when the libraries ship next to the project.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    pub runner: PathBuf,
    pub reporter: PathBuf,
}

impl SupportLocator for FixedLocator {
    fn locate(&self, component: SupportComponent) -> HarnessResult<PathBuf> {
        Ok(match component {
            SupportComponent::Runner => self.runner.clone(),
            SupportComponent::Reporter => self.reporter.clone(),
        })
    }
}
