//! Spawns the monitored command and streams its output into the pipeline.

use crate::core::{LineSink, StreamKind};
use crate::sanitize::{pump_lines, Sanitizer};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// What to run and where.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandPlan {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// The original string when the plan runs through `sh -c`.
    pub shell_command: Option<String>,
}

impl CommandPlan {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    pub fn shell(command: &str) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), command.to_string()],
            shell_command: Some(command.to_string()),
            ..Default::default()
        }
    }

    /// Human readable form used in lifecycle messages.
    pub fn describe(&self) -> String {
        match &self.shell_command {
            Some(command) => command.clone(),
            None => std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub description: String,
}

/// Runs `plan` to completion, feeding every sanitized line to `sink`.
///
/// A non-zero exit is not an error; spawn and read failures are.
#[instrument(skip_all, fields(command = %plan.describe()))]
pub async fn run_command(
    plan: &CommandPlan,
    sanitizer: Sanitizer,
    mirror: bool,
    sink: Arc<dyn LineSink>,
) -> Result<RunOutcome> {
    let mut child = plan
        .to_command()
        .spawn()
        .with_context(|| format!("Failed to start `{}`", plan.describe()))?;
    let pid = child.id();
    info!(pid, "Command started");

    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;

    let out_task = tokio::spawn(pump_lines(
        stdout,
        StreamKind::Stdout,
        sanitizer,
        mirror.then(tokio::io::stdout),
        sink.clone(),
    ));
    let err_task = tokio::spawn(pump_lines(
        stderr,
        StreamKind::Stderr,
        sanitizer,
        mirror.then(tokio::io::stderr),
        sink,
    ));

    let status = child.wait().await.context("Failed to wait for command")?;
    out_task
        .await
        .context("stdout reader panicked")?
        .context("Failed to read stdout")?;
    err_task
        .await
        .context("stderr reader panicked")?
        .context("Failed to read stderr")?;

    let exit_code = exit_code(status);
    debug!(exit_code, "Command finished");
    Ok(RunOutcome {
        exit_code,
        description: plan.describe(),
    })
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
