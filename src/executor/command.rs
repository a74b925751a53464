//! External installer process executor
//!
//! Every task is handed to one installer program (a store CLI such as
//! `legendary`, `gogdl`, or a wrapper script). The program is invoked as
//!
//! ```text
//! <program> <installer_args...> <kind> <id> --runner <runner> [--platform <p>] [--path <dir>]
//! ```
//!
//! with the full parameter object as JSON in `INSTALLQ_PARAMS`. Exit status 0
//! means done, anything else is an error carrying the tail of stderr.

use super::traits::{ExecutionOutcome, TaskExecutor};
use crate::queue::models::{TaskId, TaskKind, TaskParams};
use crate::utils::error::InstallqError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Environment variable carrying the serialized task parameters
pub const PARAMS_ENV: &str = "INSTALLQ_PARAMS";

const STDERR_TAIL_LINES: usize = 20;

/// Runs tasks by spawning the configured installer program
pub struct CommandExecutor {
    program: PathBuf,
    base_args: Vec<String>,
    running: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl CommandExecutor {
    pub fn new(program: PathBuf, base_args: Vec<String>) -> Self {
        Self {
            program,
            base_args,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `program` through PATH (or as a path) and build an executor for it
    pub fn locate(program: &str, base_args: Vec<String>) -> Result<Self> {
        let resolved = match which::which(program) {
            Ok(path) => path,
            Err(e) => {
                error!("Installer {} not found: {}", program, e);
                return Err(InstallqError::InstallerNotFound(program.to_string()).into());
            }
        };

        info!("Found installer at: {}", resolved.display());
        Ok(Self::new(resolved, base_args))
    }

    fn build_command(&self, kind: TaskKind, params: &TaskParams) -> Result<Command> {
        let params_json = serde_json::to_string(params).map_err(InstallqError::from)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg(kind.as_str())
            .arg(params.id.as_str())
            .arg("--runner")
            .arg(&params.runner);
        if let Some(platform) = &params.platform {
            command.arg("--platform").arg(platform);
        }
        if let Some(path) = &params.path {
            command.arg("--path").arg(path);
        }

        command
            .env(PARAMS_ENV, params_json)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(command)
    }

    async fn run(
        &self,
        kind: TaskKind,
        params: &TaskParams,
        token: CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let mut child = self
            .build_command(kind, params)?
            .spawn()
            .with_context(|| format!("Failed to start installer {}", self.program.display()))?;

        let stderr = child.stderr.take();
        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_string(&mut buf).await {
                    debug!("Failed to read installer stderr: {}", e);
                }
            }
            buf
        });

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = token.cancelled() => None,
        };

        let status = match exited {
            Some(status) => status.map_err(|e| {
                InstallqError::Execution(format!("failed to wait for installer: {}", e))
            })?,
            None => {
                info!("Killing installer for {}", params.id);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill installer for {}: {}", params.id, e);
                }
                stderr_reader.abort();
                return Ok(ExecutionOutcome::abort());
            }
        };

        let stderr = stderr_reader.await.unwrap_or_default();
        if status.success() {
            Ok(ExecutionOutcome::done())
        } else {
            let tail = stderr_tail(&stderr, STDERR_TAIL_LINES);
            warn!("Installer for {} exited with {}: {}", params.id, status, tail);
            Ok(ExecutionOutcome::error(format!("installer exited with {}: {}", status, tail)))
        }
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    fn id(&self) -> &'static str {
        "command"
    }

    async fn execute(&self, kind: TaskKind, params: &TaskParams) -> Result<ExecutionOutcome> {
        let token = CancellationToken::new();
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(params.id.clone(), token.clone());

        debug!("Running {} {} via {}", kind, params.id, self.program.display());
        let result = self.run(kind, params, token).await;

        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&params.id);
        result
    }

    async fn cancel(&self, id: &TaskId) -> bool {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match running.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
