//! Hotkey-driven playback page shipped inside the package.

use std::path::Path;

use serde_json::json;

use super::{ClipEntry, CONTROL_DIR};
use crate::error::WorkerResult;

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_index_html(title: &str, entries: &[ClipEntry]) -> String {
    let title = escape_html(title);
    let mut buttons = String::new();
    for entry in entries {
        buttons.push_str(&format!(
            concat!(
                "      <button class=\"clip\" data-index=\"{index}\" data-src=\"../{clip}\">\n",
                "        <img src=\"../{thumb}\" alt=\"\">\n",
                "        <span class=\"label\">{label}</span>\n",
                "        <kbd>{combo}</kbd>\n",
                "      </button>\n"
            ),
            index = entry.index,
            clip = escape_html(&entry.clip_file),
            thumb = escape_html(&entry.thumbnail_file),
            label = escape_html(&entry.label),
            combo = escape_html(&entry.hotkey.combo()),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>{title} - clip control</title>
    <style>
      body {{ background: #111; color: #eee; font-family: sans-serif; margin: 0; }}
      #player {{ width: 100%; max-height: 60vh; background: #000; }}
      #grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 8px; padding: 8px; }}
      .clip {{ background: #222; color: inherit; border: 1px solid #333; padding: 4px; cursor: pointer; }}
      .clip.playing {{ border-color: #4af; }}
      .clip img {{ width: 100%; display: block; }}
      kbd {{ font-size: 0.8em; color: #4af; }}
    </style>
  </head>
  <body>
    <video id="player" controls></video>
    <div id="grid">
{buttons}    </div>
    <script src="control.js"></script>
  </body>
</html>
"#
    )
}

pub fn render_control_js(entries: &[ClipEntry]) -> WorkerResult<String> {
    let clips: Vec<_> = entries
        .iter()
        .map(|e| {
            json!({
                "index": e.index,
                "label": e.label,
                "src": format!("../{}", e.clip_file),
                "key": e.hotkey.key(),
                "ctrl": e.hotkey.ctrl,
                "shift": e.hotkey.shift,
                "alt": e.hotkey.alt,
            })
        })
        .collect();
    let clips = serde_json::to_string_pretty(&clips)?;

    Ok(format!(
        r#"const CLIPS = {clips};

const player = document.getElementById("player");

function play(index) {{
  const clip = CLIPS.find((c) => c.index === index);
  if (!clip) return;
  player.src = clip.src;
  player.currentTime = 0;
  player.play();
  document.querySelectorAll(".clip").forEach((el) => {{
    el.classList.toggle("playing", Number(el.dataset.index) === index);
  }});
}}

document.querySelectorAll(".clip").forEach((el) => {{
  el.addEventListener("click", () => play(Number(el.dataset.index)));
}});

document.addEventListener("keydown", (event) => {{
  const clip = CLIPS.find(
    (c) =>
      c.key === event.key &&
      c.ctrl === event.ctrlKey &&
      c.shift === event.shiftKey &&
      c.alt === event.altKey
  );
  if (clip) {{
    event.preventDefault();
    play(clip.index);
  }}
}});
"#
    ))
}

/// Write `control/index.html` and `control/control.js`.
pub async fn write_control_surface(
    package_dir: &Path,
    title: &str,
    entries: &[ClipEntry],
) -> WorkerResult<()> {
    let dir = package_dir.join(CONTROL_DIR);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("index.html"), render_index_html(title, entries)).await?;
    tokio::fs::write(dir.join("control.js"), render_control_js(entries)?).await?;
    Ok(())
}
