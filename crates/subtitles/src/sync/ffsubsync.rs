//! ffsubsync-compatible command line tool.

use super::{SyncOptions, SyncTool};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest stretch of subtitle time ffsubsync scores in fast mode
const FAST_MODE_MAX_SUBTITLE_SECONDS: u32 = 180;

/// Invokes `<program> <reference> -i <input> -o <output> ...`
#[derive(Debug)]
pub struct FfsubsyncTool {
    program: String,
    resolved: OnceCell<Option<PathBuf>>,
}

impl FfsubsyncTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Resolve the program on PATH once per process
    fn resolve(&self) -> Option<&PathBuf> {
        self.resolved
            .get_or_init(|| match which::which(&self.program) {
                Ok(path) => {
                    debug!(tool = %self.program, path = %path.display(), "Found synchronization tool");
                    Some(path)
                }
                Err(e) => {
                    warn!(tool = %self.program, error = %e, "Synchronization tool not available");
                    None
                }
            })
            .as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    fn command(&self, program: &Path, input: &Path, reference: &Path, output: &Path, options: &SyncOptions) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg(reference)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("--max-offset-seconds")
            .arg(options.max_offset_seconds.to_string())
            .arg("--no-fix-framerate");

        if options.fast_mode {
            cmd.arg("--max-subtitle-seconds")
                .arg(FAST_MODE_MAX_SUBTITLE_SECONDS.to_string())
                .arg("--vad")
                .arg("webrtc");
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SyncTool for FfsubsyncTool {
    fn name(&self) -> &str {
        &self.program
    }

    async fn sync(&self, input: &Path, reference: &Path, output: &Path, options: &SyncOptions) -> SyncResult<()> {
        let program = self.resolve().ok_or_else(|| SyncError::ToolMissing {
            tool: self.program.clone(),
        })?;

        debug!(
            tool = %self.program,
            input = %input.display(),
            reference = %reference.display(),
            fast_mode = options.fast_mode,
            "Running synchronization tool"
        );

        let result = self
            .command(program, input, reference, output, options)
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(SyncError::ExitStatus {
                code: result.status.code(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(SyncError::MissingOutput {
                path: output.to_path_buf(),
            });
        }

        Ok(())
    }
}
