use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use crate::capture::FrameStore;
use crate::contract::PageMeta;
use crate::error::{FramecastError, FramecastResult};

/// Output file name used when neither an explicit name nor usable page
/// metadata is available.
pub const DEFAULT_OUTPUT: &str = "output.mp4";

/// Derive the output file name.
///
/// Precedence: explicit configured name, then a name built from page
/// metadata, then [`DEFAULT_OUTPUT`].
pub fn output_name(explicit: Option<&str>, meta: Option<&PageMeta>) -> String {
    if let Some(name) = explicit
        && !name.trim().is_empty()
    {
        return name.trim().to_string();
    }
    if let Some(base) = meta.and_then(meta_base_name) {
        return format!("{base}.mp4");
    }
    DEFAULT_OUTPUT.to_string()
}

/// Filesystem-safe base name from page metadata: sanitized name, plus the
/// date portion of the ISO date when present. `None` when the name is absent
/// or sanitizes to nothing.
fn meta_base_name(meta: &PageMeta) -> Option<String> {
    let name = sanitize_token(meta.name.as_deref()?);
    if name.is_empty() {
        return None;
    }
    let date = meta
        .date
        .as_deref()
        .map(|d| sanitize_token(d.split('T').next().unwrap_or(d)))
        .filter(|d| !d.is_empty());
    Some(match date {
        Some(date) => format!("{name}_{date}"),
        None => name,
    })
}

/// Trim, collapse whitespace runs to `_`, strip everything that is not a
/// word character or hyphen.
pub fn sanitize_token(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ensure_parent_dir(path: &Path) -> FramecastResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Encode the captured frame sequence into one MP4.
///
/// A single blocking `ffmpeg` call over the whole directory; the frame files
/// are left in place afterwards for inspection. An empty store is
/// [`FramecastError::NoFramesCaptured`] and `ffmpeg` is never spawned.
pub fn encode_mp4(store: &FrameStore, fps: u32, out_path: &Path) -> FramecastResult<()> {
    if store.is_empty() {
        return Err(FramecastError::NoFramesCaptured);
    }
    ensure_parent_dir(out_path)?;

    // System binary rather than linked FFmpeg: no native dev header/lib
    // requirements, and the encoder's own diagnostics surface on failure.
    if !is_ffmpeg_on_path() {
        return Err(FramecastError::encode(
            "ffmpeg is required for MP4 encoding, but was not found on PATH",
        ));
    }

    info!(
        frames = store.len(),
        fps,
        out = %out_path.display(),
        "encoding mp4"
    );

    let mut cmd = Command::new("ffmpeg");
    cmd.args(build_ffmpeg_args(&store.input_pattern(), fps, out_path))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = cmd.output().map_err(|e| {
        FramecastError::encode(format!(
            "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
        ))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FramecastError::encode(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

fn build_ffmpeg_args(pattern: &Path, fps: u32, out: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        pattern.display().to_string(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-profile:v".into(),
        "high".into(),
        "-movflags".into(),
        "+faststart".into(),
    ];
    args.push(out.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sanitize_collapses_whitespace_and_strips_symbols() {
        assert_eq!(sanitize_token("Main St #7!"), "Main_St_7");
        assert_eq!(sanitize_token("  spaced   out  "), "spaced_out");
        assert_eq!(sanitize_token("keep-hyphen_and_под"), "keep-hyphen_and_под");
        assert_eq!(sanitize_token("!!!"), "");
    }

    #[test]
    fn meta_name_and_date_derive_base_name() {
        let meta = PageMeta {
            name: Some("Main St #7!".to_string()),
            date: Some("2024-12-24T18:00:00Z".to_string()),
        };
        assert_eq!(output_name(None, Some(&meta)), "Main_St_7_2024-12-24.mp4");
    }

    #[test]
    fn meta_without_date_uses_name_alone() {
        let meta = PageMeta {
            name: Some("Harbor Loop".to_string()),
            date: None,
        };
        assert_eq!(output_name(None, Some(&meta)), "Harbor_Loop.mp4");
    }

    #[test]
    fn absent_or_empty_meta_falls_back_to_default() {
        assert_eq!(output_name(None, None), DEFAULT_OUTPUT);

        let meta = PageMeta {
            name: Some("???".to_string()),
            date: Some("2024-12-24".to_string()),
        };
        assert_eq!(output_name(None, Some(&meta)), DEFAULT_OUTPUT);
    }

    #[test]
    fn explicit_output_wins_over_metadata() {
        let meta = PageMeta {
            name: Some("Main St".to_string()),
            date: None,
        };
        assert_eq!(output_name(Some("route.mp4"), Some(&meta)), "route.mp4");
        assert_eq!(output_name(Some("   "), Some(&meta)), "Main_St.mp4");
    }

    #[test]
    fn ffmpeg_args_request_streaming_friendly_mp4() {
        let args = build_ffmpeg_args(
            &PathBuf::from("frames/frame_%05d.png"),
            30,
            &PathBuf::from("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -loglevel error -r 30 -i frames/frame_%05d.png"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
