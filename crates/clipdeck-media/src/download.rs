//! Video-host download using yt-dlp.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::command::MediaTools;
use crate::error::{MediaError, MediaResult};
use crate::executor::{CommandExecutor, ExecOptions};

/// Metadata reported by yt-dlp for a URL.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VideoHostInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Fetch metadata without downloading.
pub async fn fetch_video_info(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    url: &str,
    options: &ExecOptions,
) -> MediaResult<VideoHostInfo> {
    let args = vec![
        "--dump-single-json".to_string(),
        "--skip-download".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];
    let output = executor.run(&tools.ytdlp, &args, options).await?;
    Ok(serde_json::from_str(&output.stdout)?)
}

/// Arguments for a download into `dest_dir`.
pub fn download_args(url: &str, dest_dir: &Path) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--no-warnings".to_string(),
        "-f".to_string(),
        "bv*+ba/b".to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-o".to_string(),
        dest_dir
            .join("%(id)s.%(ext)s")
            .to_string_lossy()
            .to_string(),
        url.to_string(),
    ]
}

/// Download `url` into `dest_dir`, returning the written file path.
pub async fn download_video(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    url: &str,
    dest_dir: impl AsRef<Path>,
    options: &ExecOptions,
) -> MediaResult<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    tokio::fs::create_dir_all(dest_dir).await?;

    info!("Downloading {} into {}", url, dest_dir.display());

    let output = executor
        .run(&tools.ytdlp, &download_args(url, dest_dir), options)
        .await?;

    let path = parse_final_path(&output.stdout)
        .ok_or_else(|| MediaError::invalid_output("yt-dlp did not report an output file"))?;
    if !path.exists() {
        return Err(MediaError::FileNotFound(path));
    }

    info!("Downloaded {}", path.display());
    Ok(path)
}

/// Last non-empty stdout line is the final file path.
fn parse_final_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(PathBuf::from)
}
