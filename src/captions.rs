use crate::error::PipelineError;
use crate::ffmpeg::{self, VideoEncode};
use crate::srt::{self, CaptionEntry};
use crate::logok;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Shortest time a caption stays on screen.
pub const MIN_CAPTION_SECONDS: f64 = 0.5;
pub const WRAP_COLUMNS: usize = 32;

const FORCE_STYLE: &str =
    "Fontsize=14,PrimaryColour=&H00FFFFFF&,OutlineColour=&H00000000&,Outline=2,Shadow=0,Alignment=2,MarginV=60";

/// One entry per duration, laid end to end. Paragraphs without a duration
/// of their own are joined onto the last entry.
pub fn build_captions<S: AsRef<str>>(paragraphs: &[S], durations: &[f64]) -> Vec<CaptionEntry> {
    let mut entries = Vec::new();
    let count = durations.len();
    let mut clock = 0.0;

    for (i, duration) in durations.iter().enumerate() {
        let text = if i + 1 == count {
            paragraphs
                .iter()
                .skip(i)
                .map(|p| p.as_ref().trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            paragraphs
                .get(i)
                .map(|p| p.as_ref().trim().to_string())
                .unwrap_or_default()
        };

        let start = clock;
        let end = start + duration.max(MIN_CAPTION_SECONDS);
        clock = end;

        if text.is_empty() {
            continue;
        }
        entries.push(CaptionEntry {
            index: entries.len() + 1,
            start,
            end,
            text: wrap_text(&text, WRAP_COLUMNS),
        });
    }

    entries
}

/// Greedy word wrap on character counts. Words longer than `width` get a line
/// of their own.
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if line_len > 0 && line_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.push_str(word);
        line_len += word_len;
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

/// Backslash-escapes `specials` (and the backslash itself).
fn escape_chars(text: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escapes a path for the `subtitles` filter: once for the option value, once
/// more for the filtergraph around it.
fn escape_filter_path(path: &Path) -> String {
    let value = escape_chars(&path.to_string_lossy(), &['\'', ':']);
    escape_chars(&value, &['\'', '[', ']', ',', ';'])
}

pub fn subtitles_filter(srt_path: &Path) -> String {
    format!(
        "subtitles=filename={}:charenc=UTF-8:force_style='{}'",
        escape_filter_path(srt_path),
        FORCE_STYLE
    )
}

pub fn srt_path_for(video_path: &Path) -> PathBuf {
    video_path.with_extension("srt")
}

/// Writes `<id>.srt` next to the video.
pub async fn write_captions(entries: &[CaptionEntry], video_path: &Path) -> Result<PathBuf> {
    let path = srt_path_for(video_path);
    srt::write_srt(entries, &path).await?;
    Ok(path)
}

/// Draws the captions into `video` in place. The re-encode goes to a temp file
/// in the same directory which replaces `video` only on success.
pub async fn burn_in(id: &str, video: &Path, srt_path: &Path, encode: &VideoEncode) -> Result<()> {
    let caption_err = |reason: String| PipelineError::Caption {
        id: id.to_string(),
        reason,
    };

    let dir = video.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".burn-")
        .suffix(".mp4")
        .tempfile_in(dir)
        .map_err(|e| caption_err(format!("temp file: {e}")))?;

    let made = ffmpeg::ffmpeg_burn_subtitles(video, &subtitles_filter(srt_path), encode, tmp.path())
        .await
        .map_err(|e| caption_err(format!("{e:#}")))?;

    let written = tokio::fs::metadata(tmp.path())
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    if !made || !written {
        return Err(caption_err("burn-in produced no output".to_string()).into());
    }

    tmp.persist(video)
        .map_err(|e| caption_err(format!("replace {}: {}", video.display(), e.error)))?;
    logok(format!("Captions burned into {}", video.display()));
    Ok(())
}
