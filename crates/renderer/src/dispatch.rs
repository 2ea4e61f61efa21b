//! Render job contract and outcome classification.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use tile_common::{TileCoord, TileError, TileResult};

/// One tile to render: read `source`, write `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub coord: TileCoord,
}

impl RenderJob {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, coord: TileCoord) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            coord,
        }
    }

    /// Positional renderer arguments: `source destination z x y`.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.source.display().to_string(),
            self.destination.display().to_string(),
            self.coord.z.to_string(),
            self.coord.x.to_string(),
            self.coord.y.to_string(),
        ]
    }
}

/// What a finished renderer run looked like.
#[derive(Debug, Clone)]
pub struct RenderReport {
    /// Command line as it would be typed in a shell
    pub command: String,
    /// Exit status; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr
    pub output: String,
    pub elapsed: Duration,
}

impl RenderReport {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Classified result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Success { path: PathBuf },
    Failure { exit_code: Option<i32>, output: String },
}

/// Something that can turn a [`RenderJob`] into a tile on disk.
///
/// Implementations run the job to completion and report what happened.
/// `Err` is reserved for runs that never produced an exit status (the
/// renderer could not be started, or was killed on timeout).
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob) -> TileResult<RenderReport>;
}

/// Run a job once and classify the result.
///
/// Success needs a zero exit status and the destination file on disk. A
/// failed run never leaves a file behind. In traced mode it is returned as
/// `RenderOutcome::Failure` for the caller to show; otherwise it becomes
/// `TileError::RenderFailed`.
pub async fn dispatch(
    renderer: &dyn Renderer,
    job: &RenderJob,
    traced: bool,
) -> TileResult<(RenderOutcome, RenderReport)> {
    let report = match renderer.render(job).await {
        Ok(report) => report,
        Err(e) => {
            discard_partial(&job.destination).await;
            return Err(e);
        }
    };

    let outcome = if report.exited_cleanly() && tile_written(&job.destination).await {
        RenderOutcome::Success {
            path: job.destination.clone(),
        }
    } else {
        let mut output = report.output.clone();
        if report.exited_cleanly() {
            output.push_str(&format!(
                "\nrenderer exited 0 but wrote no tile at {}",
                job.destination.display()
            ));
        }
        RenderOutcome::Failure {
            exit_code: report.exit_code,
            output,
        }
    };

    match &outcome {
        RenderOutcome::Success { .. } => {
            info!(
                tile = %job.coord,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Tile rendered"
            );
        }
        RenderOutcome::Failure { exit_code, output } => {
            discard_partial(&job.destination).await;
            error!(
                tile = %job.coord,
                command = %report.command,
                exit_code = ?exit_code,
                output = %output,
                "Renderer failed"
            );
            if !traced {
                return Err(TileError::RenderFailed {
                    exit_code: *exit_code,
                    output: output.clone(),
                });
            }
        }
    }

    Ok((outcome, report))
}

/// Remove whatever a failed run left at the destination, so it is never
/// mistaken for a cached tile.
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => warn!(path = %path.display(), "Removed output of failed render"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove output of failed render"),
    }
}

async fn tile_written(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
