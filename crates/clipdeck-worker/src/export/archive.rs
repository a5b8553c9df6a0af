//! Gzipped tar archive of a staged package.

use std::fs::File;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use clipdeck_media::fs_utils::staging_path;

use crate::error::{WorkerError, WorkerResult};

/// Archive `staging_root/<package_name>` into `dest` as `<package_name>/...`.
///
/// Returns the archive size in bytes. `dest` only appears once complete.
pub async fn write_archive(
    staging_root: &Path,
    package_name: &str,
    dest: &Path,
) -> WorkerResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let source = staging_root.join(package_name);
    let partial = staging_path(dest);
    let name = package_name.to_string();
    let written = partial.clone();

    tokio::task::spawn_blocking(move || build_archive(&source, &name, &written))
        .await
        .map_err(|e| WorkerError::ArchiveFailed(format!("archive task failed: {e}")))??;

    tokio::fs::rename(&partial, dest).await?;
    let size = tokio::fs::metadata(dest).await?.len();
    Ok(size)
}

/// Remove every archive in `dir` except `keep`. Returns how many were removed.
pub async fn prune_archives(dir: &Path, keep: &Path) -> WorkerResult<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_archive = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(".tar.gz"));
        if !is_archive || path == keep || !entry.file_type().await?.is_file() {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed superseded archive {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove old archive {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

fn build_archive(source: &Path, package_name: &str, out: &Path) -> WorkerResult<()> {
    let file = File::create(out)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(package_name, source)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()?;
    Ok(())
}
