//! Backend command execution.
//!
//! Commands run one after another with stdout and stderr appended verbatim
//! to the entry's log file. The whole sequence shares one deadline, and a
//! cancelled token kills the running child.
//!
//! On unix each step leads its own process group, and the whole group is
//! killed once the step ends for any reason. Compilers and scripts a step
//! forked never outlive it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendContext, Step, step_dir};
use crate::error::BuildErrorKind;

/// Kills a step's process group when dropped.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    leader: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { leader: child.id() }
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.leader.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return;
        };
        // SAFETY: killpg takes plain integers and touches no memory. The
        // group id is the leader's pid, which stays reserved while any
        // member of the group is alive.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc == 0 {
            tracing::debug!(pgid, "killed process group");
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kill the whole group, then reap the leader.
async fn terminate(child: &mut Child, group: &ProcessGroup) {
    group.kill();
    let _ = child.kill().await;
}

/// Runs backend steps for one entry.
#[derive(Debug, Clone)]
pub struct StepRunner {
    log_path: PathBuf,
    timeout: Duration,
    tail_lines: usize,
}

impl StepRunner {
    pub fn new(log_path: impl Into<PathBuf>, timeout: Duration, tail_lines: usize) -> Self {
        Self {
            log_path: log_path.into(),
            timeout,
            tail_lines,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn open_log(&self) -> std::io::Result<File> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
    }

    /// Last `tail_lines` lines of the log.
    pub fn tail(&self) -> Vec<String> {
        let Ok(content) = std::fs::read(&self.log_path) else {
            return Vec::new();
        };
        let text = String::from_utf8_lossy(&content);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(self.tail_lines);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }

    fn invocation_failure(&self, step: &Step, exit_code: Option<i32>) -> BuildErrorKind {
        BuildErrorKind::BackendInvocation {
            command: step.display(),
            exit_code,
            log_path: self.log_path.clone(),
            log_tail: self.tail(),
        }
    }

    /// Note a runner-side problem in the log so it shows up in the tail.
    fn log_line(&self, line: &str) {
        if let Ok(mut log) = self.open_log() {
            let _ = writeln!(log, "{line}");
        }
    }

    /// Run `steps` in order from `ctx.build_dir`.
    pub async fn run(
        &self,
        steps: &[Step],
        ctx: &BackendContext,
        cancel: &CancellationToken,
    ) -> Result<(), BuildErrorKind> {
        let deadline = Instant::now() + self.timeout;

        for step in steps {
            let handles = self.open_log().and_then(|log| {
                let header = log.try_clone()?;
                let stderr = log.try_clone()?;
                Ok((header, stderr, log))
            });
            let (mut header, stderr, log) = handles.map_err(|e| BuildErrorKind::BackendInvocation {
                command: step.display(),
                exit_code: None,
                log_path: self.log_path.clone(),
                log_tail: vec![format!("cannot open log: {e}")],
            })?;
            let _ = writeln!(header, "$ {}", step.display());

            let mut command = Command::new(&step.program);
            command
                .args(&step.args)
                .current_dir(step_dir(&ctx.build_dir, step))
                .envs(ctx.env())
                .stdin(Stdio::null())
                .stdout(Stdio::from(log))
                .stderr(Stdio::from(stderr))
                .kill_on_drop(true);
            #[cfg(unix)]
            command.process_group(0);

            tracing::debug!(entry = %ctx.entry, command = %step.display(), "running backend step");
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    self.log_line(&format!("failed to start `{}`: {e}", step.program));
                    return Err(self.invocation_failure(step, None));
                }
            };

            let group = ProcessGroup::of(&child);
            let status = tokio::select! {
                status = child.wait() => status,
                _ = tokio::time::sleep_until(deadline) => {
                    terminate(&mut child, &group).await;
                    self.log_line(&format!("timed out after {}s", self.timeout.as_secs()));
                    return Err(BuildErrorKind::BackendTimeout {
                        command: step.display(),
                        seconds: self.timeout.as_secs(),
                        log_path: self.log_path.clone(),
                    });
                }
                _ = cancel.cancelled() => {
                    terminate(&mut child, &group).await;
                    self.log_line("cancelled");
                    return Err(BuildErrorKind::Cancelled);
                }
            };

            match status {
                Ok(status) if status.success() => {}
                Ok(status) => return Err(self.invocation_failure(step, status.code())),
                Err(e) => {
                    self.log_line(&format!("failed waiting for `{}`: {e}", step.program));
                    return Err(self.invocation_failure(step, None));
                }
            }
        }
        Ok(())
    }
}
