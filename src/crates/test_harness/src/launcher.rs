use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::classpath::Classpath;
use crate::error::{HarnessError, HarnessResult};

/// Quiet period that ends draining output after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(200);
/// Upper bound on draining; a grandchild holding the pipes open cannot stall the run.
const DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Origin stream for captured log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Single captured log line with its source.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
}

/// Everything needed to start one child process. Built fresh for each unit.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to start, usually `java`.
    pub program: String,
    /// Arguments placed before the system properties and classpath.
    pub jvm_args: Vec<String>,
    pub classpath: Classpath,
    pub main_class: String,
    /// Arguments after the main class; the qualified test name.
    pub program_args: Vec<String>,
    /// Rendered as `-Dkey=value`, sorted by key.
    pub system_properties: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
    /// Wall-clock limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl LaunchSpec {
    /// Start `main_class` with `program`, with no arguments, classpath or timeout yet.
    pub fn new(program: impl Into<String>, main_class: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            jvm_args: Vec::new(),
            classpath: Classpath::new(),
            main_class: main_class.into(),
            program_args: Vec::new(),
            system_properties: BTreeMap::new(),
            env: BTreeMap::new(),
            working_directory: None,
            timeout: None,
        }
    }

    /// Append arguments placed before the system properties.
    pub fn with_jvm_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jvm_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the classpath.
    pub fn with_classpath(mut self, classpath: Classpath) -> Self {
        self.classpath = classpath;
        self
    }

    /// Add an argument after the main class.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.program_args.push(arg.into());
        self
    }

    /// Set a property rendered as `-Dkey=value`.
    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    /// Set an environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Directory the child starts in.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Wall-clock limit; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to `program`, in order.
    pub fn command_args(&self) -> HarnessResult<Vec<OsString>> {
        let mut args: Vec<OsString> = self.jvm_args.iter().map(OsString::from).collect();
        for (key, value) in &self.system_properties {
            args.push(format!("-D{key}={value}").into());
        }
        if !self.classpath.is_empty() {
            args.push("-classpath".into());
            args.push(self.classpath.to_os_string()?);
        }
        args.push(self.main_class.clone().into());
        args.extend(self.program_args.iter().map(OsString::from));
        Ok(args)
    }

    fn label(&self) -> String {
        if self.program_args.is_empty() {
            self.main_class.clone()
        } else {
            self.program_args.join(" ")
        }
    }
}

/// Why a single unit did not pass. Counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitFailure {
    /// The child outlived its timeout and was killed.
    Timeout(Duration),
    /// The child exited unsuccessfully or was terminated by a signal.
    Exit(ExitStatus),
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFailure::Timeout(limit) => write!(f, "timed out after {limit:?}"),
            UnitFailure::Exit(status) => write!(f, "exited with {status}"),
        }
    }
}

/// Result of one launch.
#[derive(Debug)]
pub enum ProcessOutcome {
    Success,
    UnitFailure(UnitFailure),
    /// The harness could not run the unit at all; the run must stop.
    HarnessFailure(HarnessError),
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success)
    }
}

/// Starts a child process for a launch spec and waits for it.
pub trait Launcher {
    fn launch(&self, spec: &LaunchSpec) -> ProcessOutcome;
}

/// Launches real OS processes, forwarding their output to `tracing`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    poll_interval: Duration,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ProcessLauncher {
    /// Launcher polling every 50ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how often the child is polled for exit.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn run(&self, spec: &LaunchSpec) -> HarnessResult<ProcessOutcome> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(spec.command_args()?);
        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&spec.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(program = %spec.program, args = ?cmd.get_args().collect::<Vec<_>>(), "spawning child");
        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let (log_tx, log_rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_log_reader(stdout, LogStream::Stdout, log_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_log_reader(stderr, LogStream::Stderr, log_tx);
        }

        let label = spec.label();
        let outcome = wait_for_exit(&mut child, &log_rx, spec.timeout, self.poll_interval, &label)?;
        drain_logs(&log_rx, DRAIN_GRACE, DRAIN_LIMIT, &label);
        Ok(outcome)
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> ProcessOutcome {
        match self.run(spec) {
            Ok(outcome) => outcome,
            Err(err) => ProcessOutcome::HarnessFailure(err),
        }
    }
}

fn spawn_log_reader<R: std::io::Read + Send + 'static>(
    reader: R,
    stream: LogStream,
    tx: mpsc::Sender<LogLine>,
) {
    thread::spawn(move || {
        let buf_reader = BufReader::new(reader);
        for line in buf_reader.lines().map_while(Result::ok) {
            let _ = tx.send(LogLine {
                stream,
                line: line.trim_end().to_string(),
            });
        }
    });
}

fn wait_for_exit(
    child: &mut Child,
    log_rx: &mpsc::Receiver<LogLine>,
    timeout: Option<Duration>,
    poll_interval: Duration,
    label: &str,
) -> HarnessResult<ProcessOutcome> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(classify(status));
        }

        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                warn!(unit = label, ?limit, "child timed out, terminating");
                // Already exited is fine; the wait below reaps it either way.
                let _ = child.kill();
                child.wait()?;
                return Ok(ProcessOutcome::UnitFailure(UnitFailure::Timeout(limit)));
            }
        }

        match log_rx.recv_timeout(poll_interval) {
            Ok(line) => forward(label, &line),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => thread::sleep(poll_interval),
        }
    }
}

/// Forward buffered output until the stream goes quiet for `grace` or `limit`
/// has elapsed. Returns the number of lines forwarded.
fn drain_logs(
    log_rx: &mpsc::Receiver<LogLine>,
    grace: Duration,
    limit: Duration,
    label: &str,
) -> usize {
    let deadline = Instant::now() + limit;
    let mut forwarded = 0;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match log_rx.recv_timeout(left.min(grace)) {
            Ok(line) => {
                forward(label, &line);
                forwarded += 1;
            }
            Err(_) => break,
        }
    }
    if deadline <= Instant::now() {
        debug!(unit = label, "output still flowing after the child exited, detaching");
    }
    forwarded
}

fn classify(status: ExitStatus) -> ProcessOutcome {
    if status.success() {
        ProcessOutcome::Success
    } else {
        ProcessOutcome::UnitFailure(UnitFailure::Exit(status))
    }
}

fn forward(label: &str, line: &LogLine) {
    match line.stream {
        LogStream::Stdout => info!(target: "child", unit = label, "{}", line.line),
        LogStream::Stderr => warn!(target: "child", unit = label, "{}", line.line),
    }
}
