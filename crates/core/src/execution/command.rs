//! External command execution
//!
//! [`CommandRunner`] is the leaf utility dependency bodies use to shell out.
//! It carries shared options (environment overrides, working directory, where
//! output goes) and turns non-zero exits into [`KilnError::Command`] errors
//! that name the command line and exit code. A runner bound to a
//! [`RunContext`] kills its child when that context is cancelled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::types::{KilnError, KilnResult};

/// Where a child process stream is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Share the parent's stream
    #[default]
    Inherit,
    /// Collect the stream; captured stderr is included in failure messages
    Capture,
    /// Discard the stream
    Null,
}

impl OutputMode {
    fn stdio(self) -> Stdio {
        match self {
            OutputMode::Inherit => Stdio::inherit(),
            OutputMode::Capture => Stdio::piped(),
            OutputMode::Null => Stdio::null(),
        }
    }
}

/// Runs external commands with a common set of options.
///
/// Options are set builder-style. Cloning a runner and adjusting the clone
/// gives a child runner that inherits everything from its parent.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    env: BTreeMap<String, String>,
    workdir: Option<PathBuf>,
    stdout: OutputMode,
    stderr: OutputMode,
    cancel: Option<RunContext>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one environment variable on top of the inherited environment
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    pub fn workdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.workdir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdout(mut self, mode: OutputMode) -> Self {
        self.stdout = mode;
        self
    }

    pub fn stderr(mut self, mode: OutputMode) -> Self {
        self.stderr = mode;
        self
    }

    /// Kill the running child and fail with [`KilnError::Cancelled`] once `ctx`
    /// is cancelled. Nothing is started on an already cancelled context.
    pub fn cancel_with(mut self, ctx: &RunContext) -> Self {
        self.cancel = Some(ctx.clone());
        self
    }

    /// Run a command with arguments
    pub async fn run<I, S>(&self, cmd: &str, args: I) -> KilnResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.execute(cmd, collect_args(args), None, self.stdout)
            .await
            .map(|_| ())
    }

    /// Feed a script, one line per entry, to `bash` on stdin
    pub async fn bash<I, S>(&self, script: I) -> KilnResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let script = collect_args(script).join("\n");
        self.execute("bash", Vec::new(), Some(script), self.stdout)
            .await
            .map(|_| ())
    }

    /// Run a command and return its stdout with trailing newlines removed
    pub async fn output<I, S>(&self, cmd: &str, args: I) -> KilnResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.execute(cmd, collect_args(args), None, OutputMode::Capture)
            .await
    }

    async fn execute(
        &self,
        cmd: &str,
        args: Vec<String>,
        stdin: Option<String>,
        stdout: OutputMode,
    ) -> KilnResult<String> {
        let command_line = std::iter::once(cmd.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        if self.cancel.as_ref().is_some_and(RunContext::is_cancelled) {
            return Err(KilnError::Cancelled);
        }

        let mut command = Command::new(cmd);
        command
            .kill_on_drop(true)
            .args(&args)
            .envs(&self.env)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(stdout.stdio())
            .stderr(self.stderr.stdio());
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        info!(cmd, args = %args.join(", "), "exec");

        let mut child = command.spawn().map_err(|e| {
            KilnError::Command(format!("failed to run \"{}\": {}", command_line, e))
        })?;

        if let (Some(script), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // The child may exit before reading everything; its exit status
            // decides the outcome, not the write.
            if let Err(e) = pipe.write_all(script.as_bytes()).await {
                debug!(cmd, error = %e, "failed to write script to stdin");
            }
            drop(pipe);
        }

        // Dropping the wait future drops the child, which kills it.
        let output = match &self.cancel {
            Some(ctx) => tokio::select! {
                output = child.wait_with_output() => output,
                _ = ctx.cancelled() => {
                    debug!(cmd, "cancelled, killing child");
                    return Err(KilnError::Cancelled);
                }
            },
            None => child.wait_with_output().await,
        };
        let output = output.map_err(|e| {
            KilnError::Command(format!("failed to run \"{}\": {}", command_line, e))
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout)
                .trim_end_matches('\n')
                .to_string());
        }

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim_end_matches('\n');
        if stderr.is_empty() {
            Err(KilnError::Command(format!(
                "running \"{}\" failed with exit code {}",
                command_line, code
            )))
        } else {
            Err(KilnError::Command(format!(
                "running \"{}\" failed with exit code {}: {}",
                command_line, code, stderr
            )))
        }
    }
}

fn collect_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().map(|arg| arg.as_ref().to_string()).collect()
}
