pub mod ffmpeg;

use std::path::{Path, PathBuf};

use anyhow::Result;

pub use ffmpeg::FfmpegMerger;

/// Joins a batch's segment files into one video, in the given order.
#[async_trait::async_trait]
pub trait SegmentMerger: Send + Sync {
    async fn merge(&self, ordered_paths: &[PathBuf], output: &Path) -> Result<PathBuf>;
}
