//! Renderer that runs an external program per tile.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use tile_common::{RendererConfig, TileError, TileResult};

use crate::dispatch::{RenderJob, RenderReport, Renderer};

/// Runs `program [args...] source destination z x y` for every job.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(&config.program, config.args.clone(), config.timeout())
    }

    /// Full argument vector for a job, program first.
    pub fn command_line(&self, job: &RenderJob) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.args.len() + 5);
        argv.push(self.program.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv.extend(job.args());
        argv
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, job: &RenderJob) -> TileResult<RenderReport> {
        let command = shell_join(&self.command_line(job));
        debug!(command = %command, "Starting renderer");

        let start = Instant::now();
        let child = Command::new(&self.program)
            .args(&self.args)
            .args(job.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TileError::RenderSpawnError(format!("{}: {}", self.program.display(), e)))?;

        let finished = match self.timeout {
            // Dropping the wait future drops the child, which kills it
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(command = %command, timeout_secs = limit.as_secs(), "Renderer timed out, killed");
                    return Err(TileError::RenderTimeout(limit.as_secs()));
                }
            },
            None => child.wait_with_output().await,
        };
        let output = finished.map_err(|e| TileError::RenderSpawnError(e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(RenderReport {
            command,
            exit_code: output.status.code(),
            output: combined,
            elapsed: start.elapsed(),
        })
    }
}

/// Join arguments into a copy-pasteable shell command.
fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
