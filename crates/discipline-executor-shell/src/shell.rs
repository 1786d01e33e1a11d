//! Command launcher

use async_trait::async_trait;
use discipline_executor_api::{CommandOutput, ExecutorError, ExecutorResult, PrivilegedExecutor};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executor that shells out through a fixed argv prefix
pub struct ShellExecutor {
    prefix: Vec<String>,
    readiness_probe: String,
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(prefix: Vec<String>, readiness_probe: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prefix,
            readiness_probe: readiness_probe.into(),
            timeout,
        }
    }

    fn build(&self, command: &str) -> ExecutorResult<Command> {
        let (program, args) = self
            .prefix
            .split_first()
            .ok_or_else(|| ExecutorError::Internal("empty command prefix".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl PrivilegedExecutor for ShellExecutor {
    async fn ready(&self) -> bool {
        match self.run_command(&self.readiness_probe).await {
            Ok(out) if out.exit_code == 0 => true,
            Ok(out) => {
                debug!(exit_code = out.exit_code, output = %out.output, "Readiness probe failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "Readiness probe could not run");
                false
            }
        }
    }

    async fn run_command(&self, command: &str) -> ExecutorResult<CommandOutput> {
        debug!(command = %command, "Executing privileged command");

        let child = self.build(command)?.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(command = %command, timeout = ?self.timeout, "Privileged command timed out");
                return Err(ExecutorError::Timeout(self.timeout));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        // Killed by a signal: no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(command = %command, exit_code, "Privileged command finished");

        Ok(CommandOutput::new(exit_code, text.trim()))
    }
}
