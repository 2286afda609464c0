//! External phoneme-recognizer plumbing.
//!
//! `rhubarb` is invoked against the speech track and its tab-separated
//! `start<TAB>label` output is normalized into raw segments for
//! [`Timeline::from_segments`](crate::timeline::Timeline::from_segments).
//! The tool only accepts `.wav` and `.ogg` input; other formats are
//! transcoded to a sibling `.wav` file through `ffmpeg` first.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{LipwaveError, LipwaveResult};
use crate::timeline::Label;

/// Invoke `rhubarb -q` on `audio` and parse its timed-segment output.
///
/// Returns raw `(start, label)` segments in the order the tool printed
/// them; normalization (sorting, run collapsing) happens in the timeline
/// parser.
pub fn run_rhubarb(audio: &Path) -> LipwaveResult<Vec<(f64, Label)>> {
    let out = Command::new("rhubarb")
        .arg("-q")
        .arg(audio)
        .output()
        .map_err(|e| {
            LipwaveError::external(format!(
                "failed to run rhubarb (is it installed and on PATH?): {e}"
            ))
        })?;
    if !out.status.success() {
        return Err(LipwaveError::external(format!(
            "rhubarb failed for '{}': {}",
            audio.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let text = String::from_utf8_lossy(&out.stdout);
    parse_rhubarb_output(&text)
}

/// Parse rhubarb's `start<TAB>label` lines.
fn parse_rhubarb_output(text: &str) -> LipwaveResult<Vec<(f64, Label)>> {
    let mut segments = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_start, raw_label)) = line.split_once('\t') else {
            return Err(LipwaveError::validation(format!(
                "recognizer output line {}: expected 'start<TAB>label', got '{line}'",
                line_no + 1
            )));
        };
        let start: f64 = raw_start.trim().parse().map_err(|_| {
            LipwaveError::validation(format!(
                "recognizer output line {}: bad timestamp '{raw_start}'",
                line_no + 1
            ))
        })?;
        let label = Label::parse(raw_label.trim()).map_err(|_| {
            LipwaveError::validation(format!(
                "recognizer output line {}: bad label '{raw_label}'",
                line_no + 1
            ))
        })?;
        segments.push((start, label));
    }
    Ok(segments)
}

/// Return a path rhubarb can consume, transcoding when necessary.
///
/// `.wav` and `.ogg` inputs pass through untouched; anything else is
/// converted to a sibling `<name>.<ext>.wav` (overwriting any previous
/// conversion) via `ffmpeg`.
pub fn ensure_rhubarb_input(audio: &Path) -> LipwaveResult<PathBuf> {
    let ext = audio
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if matches!(ext.as_deref(), Some("wav") | Some("ogg")) {
        return Ok(audio.to_path_buf());
    }

    let mut wav = audio.as_os_str().to_owned();
    wav.push(".wav");
    let wav = PathBuf::from(wav);

    let out = Command::new("ffmpeg")
        .args(["-loglevel", "error", "-y", "-i"])
        .arg(audio)
        .arg(&wav)
        .output()
        .map_err(|e| {
            LipwaveError::external(format!(
                "failed to run ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
    if !out.status.success() {
        return Err(LipwaveError::external(format!(
            "ffmpeg wav conversion failed for '{}': {}",
            audio.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    Ok(wav)
}

/// Probe the audio track's duration in seconds through `ffprobe`.
pub fn probe_duration(audio: &Path) -> LipwaveResult<f64> {
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        format: ProbeFormat,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(audio)
        .output()
        .map_err(|e| LipwaveError::external(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(LipwaveError::external(format!(
            "ffprobe failed for '{}': {}",
            audio.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| LipwaveError::external(format!("ffprobe json parse failed: {e}")))?;
    let raw = parsed.format.duration.ok_or_else(|| {
        LipwaveError::external(format!(
            "ffprobe reported no duration for '{}'",
            audio.display()
        ))
    })?;
    let duration: f64 = raw.parse().map_err(|_| {
        LipwaveError::external(format!("ffprobe reported bad duration '{raw}'"))
    })?;

    Ok(duration)
}
