//! OBS provisioning script and its config.
//!
//! The script reads `obs_config.json` next to it and creates one scene with a
//! media source and a hotkey per clip through obs-websocket.

use std::path::Path;

use serde::Serialize;

use super::{ClipEntry, AUTOMATION_DIR};
use crate::error::WorkerResult;

pub const OBS_WEBSOCKET_PORT: u16 = 4455;

#[derive(Debug, Clone, Serialize)]
pub struct ObsConfig {
    pub websocket: WebsocketConfig,
    pub scene: String,
    pub sources: Vec<ObsSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebsocketConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObsSource {
    pub name: String,
    /// Relative to the package root
    pub file: String,
    pub hotkey: ObsHotkey,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObsHotkey {
    pub key: String,
    pub control: bool,
    pub shift: bool,
    pub alt: bool,
}

pub fn build_obs_config(package_name: &str, entries: &[ClipEntry]) -> ObsConfig {
    ObsConfig {
        websocket: WebsocketConfig {
            host: "localhost".to_string(),
            port: OBS_WEBSOCKET_PORT,
        },
        scene: format!("{} Clips", package_name),
        sources: entries
            .iter()
            .map(|e| ObsSource {
                name: e.stem.clone(),
                file: e.clip_file.clone(),
                hotkey: ObsHotkey {
                    key: e.hotkey.obs_key(),
                    control: e.hotkey.ctrl,
                    shift: e.hotkey.shift,
                    alt: e.hotkey.alt,
                },
            })
            .collect(),
    }
}

const OBS_SETUP_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Create the clip scene, media sources and hotkeys in OBS.

Requires OBS 28+ with obs-websocket enabled and `pip install obsws-python`.
Run from anywhere; paths are resolved relative to this package.
"""

import json
import os
import sys

import obsws_python as obs

HERE = os.path.dirname(os.path.abspath(__file__))
PACKAGE_ROOT = os.path.dirname(HERE)


def load_config():
    with open(os.path.join(HERE, "obs_config.json"), encoding="utf-8") as f:
        return json.load(f)


def main():
    config = load_config()
    ws = config["websocket"]
    password = os.environ.get("OBS_WEBSOCKET_PASSWORD", "")
    client = obs.ReqClient(host=ws["host"], port=ws["port"], password=password)

    scene = config["scene"]
    existing = {s["sceneName"] for s in client.get_scene_list().scenes}
    if scene not in existing:
        client.create_scene(scene)

    for source in config["sources"]:
        path = os.path.join(PACKAGE_ROOT, source["file"])
        settings = {"local_file": path, "restart_on_activate": True, "close_when_inactive": True}
        try:
            client.create_input(scene, source["name"], "ffmpeg_source", settings, False)
        except Exception as exc:  # already present
            print(f"skipping {source['name']}: {exc}", file=sys.stderr)
            continue

        hotkey = source["hotkey"]
        print(
            f"{source['name']}: bind {hotkey['key']}"
            f" ctrl={hotkey['control']} shift={hotkey['shift']} alt={hotkey['alt']}"
        )

    print(f"Provisioned {len(config['sources'])} sources in scene '{scene}'")


if __name__ == "__main__":
    main()
"#;

/// Write `automation/obs_setup.py` and `automation/obs_config.json`.
pub async fn write_automation(
    package_dir: &Path,
    package_name: &str,
    entries: &[ClipEntry],
) -> WorkerResult<()> {
    let dir = package_dir.join(AUTOMATION_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    let config = build_obs_config(package_name, entries);
    tokio::fs::write(
        dir.join("obs_config.json"),
        serde_json::to_vec_pretty(&config)?,
    )
    .await?;
    tokio::fs::write(dir.join("obs_setup.py"), OBS_SETUP_SCRIPT).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_entries;

    #[test]
    fn test_config_maps_hotkeys() {
        let entries = test_entries(26);
        let config = build_obs_config("Stream", &entries);

        assert_eq!(config.scene, "Stream Clips");
        assert_eq!(config.websocket.port, 4455);
        assert_eq!(config.sources.len(), 26);

        let last = &config.sources[25];
        assert_eq!(last.hotkey.key, "OBS_KEY_F2");
        assert!(last.hotkey.control && last.hotkey.shift && !last.hotkey.alt);
    }
}
