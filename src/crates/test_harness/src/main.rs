//! `gwt-test` entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    // Structured logging with an env-based filter, defaulting to info
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    gwt_test_harness::cli::run()
}
