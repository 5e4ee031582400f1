use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

/// Video encoder settings for one ffmpeg pass.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncode {
    pub fps: u32,
    pub preset: String,
    pub crf: Option<u8>,
    pub bitrate: Option<String>,
    pub threads: u32,
}

impl VideoEncode {
    /// Fast, visually lossless-enough settings for scratch segments.
    pub fn intermediate(fps: u32) -> Self {
        Self {
            fps,
            preset: "veryfast".to_string(),
            crf: Some(18),
            bitrate: None,
            threads: 0,
        }
    }

    /// Delivery settings for the final file.
    pub fn delivery(fps: u32) -> Self {
        Self {
            fps,
            preset: "medium".to_string(),
            crf: None,
            bitrate: Some("8000k".to_string()),
            threads: 4,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-r".to_string(),
            self.fps.to_string(),
            "-preset".to_string(),
            self.preset.clone(),
        ];
        if let Some(crf) = self.crf {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }
        if let Some(bitrate) = &self.bitrate {
            args.push("-b:v".to_string());
            args.push(bitrate.clone());
        }
        if self.threads > 0 {
            args.push("-threads".to_string());
            args.push(self.threads.to_string());
        }
        args
    }
}

fn base_args() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }
    cmd.kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Command execution failed: {}", args[0]))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(6)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" | ");
        return Err(anyhow::anyhow!(
            "{} exited with {}: {}",
            args[0],
            output.status,
            tail
        ));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration for {}", path.display()));
    }
    Ok(duration)
}

/// Encodes one silent, normalized segment of exactly `duration_s` seconds.
pub async fn ffmpeg_encode_segment(
    input_args: &[String],
    filter: &str,
    duration_s: f64,
    encode: &VideoEncode,
    out_mp4: &Path,
) -> Result<bool> {
    let mut args = base_args();
    args.extend(input_args.iter().cloned());
    args.extend([
        "-t".to_string(),
        format!("{:.3}", duration_s),
        "-vf".to_string(),
        filter.to_string(),
        "-an".to_string(),
    ]);
    args.extend(encode.args());
    args.push(out_mp4.display().to_string());

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Transcodes narration into the AAC track muxed into the final file.
pub async fn ffmpeg_narration_to_aac(in_audio: &Path, out_m4a: &Path) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        in_audio.display().to_string(),
        "-vn".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        out_m4a.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_m4a.exists())
}

/// Joins the listed segments and attaches `audio` as the only sound track.
pub async fn ffmpeg_concat_with_audio(
    list_txt: &Path,
    audio: &Path,
    encode: &VideoEncode,
    out_mp4: &Path,
) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
    ]);
    args.extend(encode.args());
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        out_mp4.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Re-encodes `video_in` with the subtitle file drawn into the picture.
pub async fn ffmpeg_burn_subtitles(
    video_in: &Path,
    subtitles_filter: &str,
    encode: &VideoEncode,
    video_out: &Path,
) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        video_in.display().to_string(),
        "-vf".to_string(),
        subtitles_filter.to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
    ]);
    args.extend(encode.args());
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        video_out.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(video_out.exists())
}
