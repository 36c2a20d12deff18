//! External tool invocation and per-item outcome logging

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use dockflow_sdk::{
    log_task_complete, log_task_failed, log_task_skipped, log_task_timed_out,
};

use crate::workflow_utils::batch::{ItemReport, Outcome};

/// A fully resolved command for one external tool run
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    /// File the tool must leave behind for the run to count as a success
    pub expected_output: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            expected_output: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn expect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments as one display string
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured result of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub artifact: Option<PathBuf>,
    pub stdout: String,
    pub stderr: String,
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join(" | ")
}

fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Run one external tool and classify the result
///
/// Spawn errors, non-zero exits and a missing or empty expected output all map to
/// [`Outcome::Failed`]; exceeding the invocation's timeout kills the child and maps
/// to [`Outcome::TimedOut`]. This never returns an error.
pub async fn run_tool(invocation: &ToolInvocation) -> Outcome<ToolOutput> {
    let name = invocation.program_name();

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &invocation.cwd {
        cmd.current_dir(cwd);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return Outcome::Failed(format!("failed to start {}: {}", name, e)),
    };

    let output = match invocation.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => return Outcome::TimedOut(limit),
        },
        None => child.wait_with_output().await,
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => return Outcome::Failed(format!("{} did not complete: {}", name, e)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Outcome::Failed(format!(
            "{} exited with status {}: {}",
            name,
            code,
            tail(&stderr, 3)
        ));
    }

    if let Some(expected) = &invocation.expected_output {
        if !is_nonempty_file(expected) {
            return Outcome::Failed(format!(
                "{} produced no output at {}",
                name,
                expected.display()
            ));
        }
    }

    Outcome::Success(ToolOutput {
        artifact: invocation.expected_output.clone(),
        stdout,
        stderr,
    })
}

/// Emit the structured event matching an item's outcome
pub fn log_report<R>(task_prefix: &str, report: &ItemReport<R>, summary: impl Fn(&R) -> String) {
    let task_id = format!("{}_{}", task_prefix, report.key);
    match &report.outcome {
        Outcome::Success(r) => {
            log_task_complete!(&task_id, summary(r));
            println!(
                "  \x1b[32m✓\x1b[0m {} ({:.2}s) {}",
                report.key,
                report.elapsed.as_secs_f64(),
                summary(r)
            );
        }
        Outcome::Failed(e) => {
            log_task_failed!(&task_id, e);
            println!("  \x1b[31m✗\x1b[0m {}: {}", report.key, e);
        }
        Outcome::TimedOut(after) => {
            log_task_timed_out!(&task_id, after);
            println!(
                "  \x1b[33m⏱\x1b[0m {} timed out after {:.0}s",
                report.key,
                after.as_secs_f64()
            );
        }
        Outcome::Skipped(reason) => {
            log_task_skipped!(&task_id, reason);
            println!("  – {} skipped: {}", report.key, reason);
        }
    }
}
