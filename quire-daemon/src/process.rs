//! Bounded-time external command runner.
//!
//! A run ends when the child exits or the deadline passes, whichever comes
//! first. On expiry the child is killed and reaped before returning. The
//! outcome is reported, never raised: callers decide what a failure means.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Program, arguments, and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Shell-ish rendering for log lines.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded,
    /// Exited non-zero; `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    /// Could not be started or waited on.
    Error { reason: String },
    /// Killed at the deadline.
    TimedOut,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    verbose: bool,
}

impl ProcessRunner {
    /// With `verbose`, the child's stdout/stderr go to ours.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub async fn run(&self, spec: &CommandSpec, deadline: Duration) -> ProcessOutcome {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        if self.verbose {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let command_line = spec.display();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(command = %command_line, error = %err, "failed to start process");
                return ProcessOutcome::Error {
                    reason: err.to_string(),
                };
            }
        };

        let outcome = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) if status.success() => ProcessOutcome::Succeeded,
            Ok(Ok(status)) => ProcessOutcome::Failed {
                code: status.code(),
            },
            Ok(Err(err)) => ProcessOutcome::Error {
                reason: err.to_string(),
            },
            Err(_) => {
                if let Err(err) = child.kill().await {
                    tracing::error!(command = %command_line, error = %err, "failed to kill timed-out process");
                }
                ProcessOutcome::TimedOut
            }
        };
        match &outcome {
            ProcessOutcome::Succeeded => {
                tracing::debug!(command = %command_line, "process done");
            }
            ProcessOutcome::TimedOut => {
                tracing::warn!(command = %command_line, deadline_secs = deadline.as_secs_f64(), "process killed at deadline");
            }
            other => {
                tracing::warn!(command = %command_line, outcome = ?other, "process done with error");
            }
        }
        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn success_and_exit_codes_are_reported() {
        let runner = ProcessRunner::new(false);
        let ok = runner
            .run(&CommandSpec::new("sh").arg("-c").arg("exit 0"), Duration::from_secs(5))
            .await;
        assert_eq!(ok, ProcessOutcome::Succeeded);

        let failed = runner
            .run(&CommandSpec::new("sh").arg("-c").arg("exit 3"), Duration::from_secs(5))
            .await;
        assert_eq!(failed, ProcessOutcome::Failed { code: Some(3) });
        assert!(!failed.is_success());
    }

    #[tokio::test]
    async fn deadline_kills_the_process() {
        let runner = ProcessRunner::new(false);
        let started = Instant::now();
        let outcome = runner
            .run(&CommandSpec::new("sleep").arg("30"), Duration::from_millis(200))
            .await;
        assert_eq!(outcome, ProcessOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_an_error_outcome() {
        let runner = ProcessRunner::new(false);
        let outcome = runner
            .run(&CommandSpec::new("quire-no-such-program"), Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, ProcessOutcome::Error { .. }), "got {outcome:?}");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let runner = ProcessRunner::new(false);
        let outcome = runner
            .run(
                &CommandSpec::new("sh").arg("-c").arg("touch marker").current_dir(dir.path()),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(outcome, ProcessOutcome::Succeeded);
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("git").arg("clone").arg("git://x/r.git");
        assert_eq!(spec.display(), "git clone git://x/r.git");
    }
}
