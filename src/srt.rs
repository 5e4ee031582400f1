use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEntry {
    /// 1-based, as written to the file.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// `HH:MM:SS,mmm`, rounded to the nearest millisecond.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let ss = total_s % 60;
    let mm = (total_s / 60) % 60;
    let hh = total_s / 3600;
    format!("{hh:02}:{mm:02}:{ss:02},{ms:03}")
}

pub fn render_srt(entries: &[CaptionEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{}", entry.index);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(entry.start),
            format_timestamp(entry.end)
        );
        let _ = writeln!(out, "{}", entry.text);
        out.push('\n');
    }
    out
}

pub async fn write_srt(entries: &[CaptionEntry], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create srt directory: {}", parent.display()))?;
    }
    let mut out = fs::File::create(path)
        .await
        .with_context(|| format!("create srt output: {}", path.display()))?;
    out.write_all(render_srt(entries).as_bytes())
        .await
        .with_context(|| format!("write srt output: {}", path.display()))?;
    out.flush()
        .await
        .with_context(|| format!("flush srt output: {}", path.display()))?;
    Ok(())
}
