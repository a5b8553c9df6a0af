//! Filesystem helpers for derived artifacts.
//!
//! Artifacts are written to a sibling temporary path and moved into place, so
//! readers never observe a half-written clip. Moves across filesystems (the
//! managed temp dir may live on a different mount than the data dir) fall back
//! to copy-and-delete.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move `src` to `dst`, replacing any existing file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let staged = dst.with_extension("moving");

    fs::copy(src, &staged).await?;
    if let Err(e) = fs::rename(&staged, dst).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove {} after cross-device move: {}",
            src.display(),
            e
        );
    }
    Ok(())
}

/// Remove a file, treating a missing file as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Sibling path used while an artifact is being written.
///
/// Keeps the original extension last so FFmpeg still infers the container.
pub fn staging_path(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match final_path.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    final_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_creates_parent_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("clips").join("r1.mp4");

        fs::create_dir_all(dst.parent().unwrap()).await.unwrap();
        fs::write(&dst, b"old").await.unwrap();
        fs::write(&src, b"new").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.mp4");

        assert!(!remove_file_if_exists(&path).await.unwrap());
        fs::write(&path, b"x").await.unwrap();
        assert!(remove_file_if_exists(&path).await.unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/data/r/clips/abc.mp4")),
            PathBuf::from("/data/r/clips/abc.partial.mp4")
        );
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
