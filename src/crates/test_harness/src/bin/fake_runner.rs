//! Stand-in for the JVM test runner. Accepts a java-style command line, writes
//! what it received into the reports directory, then behaves according to the
//! simple name of the test class:
//!
//! - `*Hang*` sleeps until killed
//! - `*Fail*` exits with status 1
//! - anything else exits successfully

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use gwt_test_harness::{split_args, ARGS_PROPERTY, REPORTS_PROPERTY};
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
struct Invocation {
    test: String,
    main_class: String,
    classpath: Vec<PathBuf>,
    properties: BTreeMap<String, String>,
    gwt_args: Vec<String>,
    working_directory: Option<PathBuf>,
    jvm_args: Vec<String>,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let invocation = parse_invocation(env::args().skip(1))?;
    println!("running {}", invocation.test);

    if let Some(reports) = invocation.properties.get(REPORTS_PROPERTY) {
        let dir = PathBuf::from(reports);
        fs::create_dir_all(&dir)?;
        let report = dir.join(format!("TEST-{}.json", invocation.test));
        fs::write(report, serde_json::to_vec_pretty(&invocation)?)?;
    }

    let simple_name = invocation
        .test
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_string();
    if simple_name.contains("Hang") {
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }
    if simple_name.contains("Fail") {
        eprintln!("{} failed: expected <true> but was <false>", invocation.test);
        return Ok(ExitCode::from(1));
    }
    println!("OK (1 test)");
    Ok(ExitCode::SUCCESS)
}

fn parse_invocation(
    mut args: impl Iterator<Item = String>,
) -> Result<Invocation, Box<dyn std::error::Error>> {
    let mut invocation = Invocation {
        working_directory: env::current_dir().ok(),
        ..Invocation::default()
    };

    while let Some(arg) = args.next() {
        if let Some(property) = arg.strip_prefix("-D") {
            let (key, value) = property.split_once('=').unwrap_or((property, ""));
            invocation
                .properties
                .insert(key.to_string(), value.to_string());
        } else if arg == "-classpath" || arg == "-cp" {
            let joined = args.next().ok_or("-classpath requires a value")?;
            invocation.classpath = env::split_paths(&joined).collect();
        } else if arg.starts_with('-') {
            invocation.jvm_args.push(arg);
        } else {
            invocation.main_class = arg;
            invocation.test = args.next().ok_or("missing test class argument")?;
            break;
        }
    }

    if let Some(line) = invocation.properties.get(ARGS_PROPERTY) {
        invocation.gwt_args = split_args(line);
    }
    Ok(invocation)
}
