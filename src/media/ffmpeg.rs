use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;

use super::SegmentMerger;
use crate::utils::logging::preview;
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// Video codec attempts, cheapest first. Stream copy only works when every
/// segment shares one encoding; the re-encodes cover the rest.
const CODEC_ATTEMPTS: [&[&str]; 3] = [
    &["-c", "copy"],
    &["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"],
    &["-c:v", "mpeg4", "-q:v", "5"],
];

/// Merges segments with ffmpeg's concat demuxer.
pub struct FfmpegMerger {
    program: PathBuf,
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegMerger {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, list_path: &Path, codec_args: &[&str], output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_path)
            .args(codec_args)
            .arg("-an")
            .arg(output)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!(
                "ffmpeg exited with {:?}: {}",
                result.status.code(),
                preview(stderr.trim(), 300)
            );
        }
        Ok(())
    }
}

/// Body of a concat demuxer list file. Single quotes inside a path are
/// escaped the way the demuxer expects.
fn concat_list(paths: &[PathBuf]) -> String {
    let mut body = String::new();
    for path in paths {
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        body.push_str("file '");
        body.push_str(&escaped);
        body.push_str("'\n");
    }
    body
}

#[async_trait::async_trait]
impl SegmentMerger for FfmpegMerger {
    async fn merge(&self, ordered_paths: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if ordered_paths.is_empty() {
            bail!("no segments to merge");
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(ordered_paths))
            .await
            .with_context(|| format!("failed to write {}", list_path.display()))?;

        let mut last_error = None;
        for codec_args in CODEC_ATTEMPTS {
            match self.run(&list_path, codec_args, output).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(err) => {
                    log_warn!("Merge with {:?} failed: {err:#}", codec_args);
                    last_error = Some(err);
                }
            }
        }

        let _ = tokio::fs::remove_file(&list_path).await;

        if let Some(err) = last_error {
            let _ = tokio::fs::remove_file(output).await;
            return Err(anyhow!(
                "could not merge {} segments into {}: {err:#}",
                ordered_paths.len(),
                output.display()
            ));
        }

        log_info!(
            "Merged {} segments into {}",
            ordered_paths.len(),
            output.display()
        );
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn concat_list_quotes_every_path_in_order() {
        let list = concat_list(&[
            PathBuf::from("/r/chunk_1.mp4"),
            PathBuf::from("/r/it's.mp4"),
        ]);
        assert_eq!(list, "file '/r/chunk_1.mp4'\nfile '/r/it'\\''s.mp4'\n");
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let merger = FfmpegMerger::default();
        assert!(merger.merge(&[], &dir.path().join("out.mp4")).await.is_err());
    }

    #[tokio::test]
    async fn missing_binary_fails_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("batches").join("batch.mp4");
        let merger = FfmpegMerger::with_program(dir.path().join("no-such-ffmpeg"));

        let result = merger
            .merge(&[dir.path().join("a.mp4"), dir.path().join("b.mp4")], &output)
            .await;
        assert!(result.is_err());
        assert!(!output.with_extension("concat.txt").exists());
    }
}
