//! Machine- and human-readable package metadata.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::json;

use clipdeck_models::{ExportOptions, Resource};

use super::{ClipEntry, METADATA_DIR};
use crate::error::WorkerResult;

pub fn clips_document(
    resource: &Resource,
    options: &ExportOptions,
    entries: &[ClipEntry],
    generated_at: DateTime<Utc>,
) -> serde_json::Value {
    json!({
        "resource_id": resource.id,
        "generated_at": generated_at,
        "quality": options.quality,
        "naming": options.naming,
        "clip_count": entries.len(),
        "clips": entries
            .iter()
            .map(|e| json!({
                "index": e.index,
                "range_id": e.range_id,
                "label": e.label,
                "start": e.start,
                "end": e.end,
                "duration": (e.end - e.start).max(0.0),
                "file": e.clip_file,
                "thumbnail": e.thumbnail_file,
                "hotkey": e.hotkey.combo(),
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn hotkeys_document(entries: &[ClipEntry]) -> serde_json::Value {
    json!(entries
        .iter()
        .map(|e| json!({
            "index": e.index,
            "label": e.label,
            "combo": e.hotkey.combo(),
            "obs_key": e.hotkey.obs_key(),
            "tier": e.hotkey.tier,
            "slot": e.hotkey.slot,
        }))
        .collect::<Vec<_>>())
}

pub fn readme(resource: &Resource, options: &ExportOptions, entries: &[ClipEntry]) -> String {
    let mut text = format!(
        "{title}\n{underline}\n\n\
         {count} clips exported at {quality} quality.\n\n\
         Layout:\n  \
         clips/        trimmed clips\n  \
         thumbnails/   one still per clip\n  \
         control/      open index.html for hotkey playback\n  \
         automation/   obs_setup.py provisions OBS from obs_config.json\n  \
         metadata/     clips.json, hotkeys.json, resource.json\n\n\
         Hotkeys:\n",
        title = if resource.title.is_empty() {
            &resource.name
        } else {
            &resource.title
        },
        underline = "=".repeat(40),
        count = entries.len(),
        quality = options.quality,
    );
    for entry in entries {
        text.push_str(&format!(
            "  {:<16} {}\n",
            entry.hotkey.combo(),
            entry.label
        ));
    }
    text
}

/// Write `metadata/clips.json`, `metadata/resource.json` and `README.txt`.
pub async fn write_metadata(
    package_dir: &Path,
    resource: &Resource,
    options: &ExportOptions,
    entries: &[ClipEntry],
) -> WorkerResult<()> {
    let dir = package_dir.join(METADATA_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    let clips = clips_document(resource, options, entries, Utc::now());
    tokio::fs::write(dir.join("clips.json"), serde_json::to_vec_pretty(&clips)?).await?;
    tokio::fs::write(dir.join("resource.json"), serde_json::to_vec_pretty(resource)?).await?;
    tokio::fs::write(
        package_dir.join("README.txt"),
        readme(resource, options, entries),
    )
    .await?;
    Ok(())
}

/// Write `metadata/hotkeys.json`.
pub async fn write_hotkeys(package_dir: &Path, entries: &[ClipEntry]) -> WorkerResult<()> {
    let dir = package_dir.join(METADATA_DIR);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(
        dir.join("hotkeys.json"),
        serde_json::to_vec_pretty(&hotkeys_document(entries))?,
    )
    .await?;
    Ok(())
}
