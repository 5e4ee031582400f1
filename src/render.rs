use crate::clip_plan::Segment;
use crate::compose::SegmentComposer;
use crate::error::PipelineError;
use crate::ffmpeg::{self, VideoEncode};
use crate::tts::NarrationAudio;
use crate::{logi, logok};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Everything needed to produce one final video. Consumed by [`Renderer::render`].
#[derive(Debug)]
pub struct RenderJob {
    pub id: String,
    pub segments: Vec<Segment>,
    pub narration: NarrationAudio,
    pub output_path: PathBuf,
}

pub fn output_path_for(output_dir: &Path, id: &str) -> PathBuf {
    output_dir.join(format!("{id}.mp4"))
}

fn concat_list(paths: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in paths {
        let escaped = path.to_string_lossy().replace('\'', "'\\''");
        let _ = writeln!(out, "file '{escaped}'");
    }
    out
}

pub struct Renderer {
    pub composer: SegmentComposer,
    pub encode: VideoEncode,
    /// Parent for per-job scratch directories.
    pub scratch_root: PathBuf,
}

impl Renderer {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        let composer = SegmentComposer::default();
        let encode = VideoEncode::delivery(composer.frame.fps);
        Self {
            composer,
            encode,
            scratch_root: scratch_root.into(),
        }
    }

    /// Renders `job` to its output path. Intermediate media lives in a scratch
    /// directory that is removed however this returns, and nothing appears at
    /// the final path unless the whole render succeeded.
    pub async fn render(&self, job: RenderJob) -> Result<PathBuf> {
        let id = job.id.clone();
        self.render_inner(job).await.map_err(|e| {
            anyhow::Error::from(PipelineError::Render {
                id,
                reason: format!("{e:#}"),
            })
        })
    }

    async fn render_inner(&self, job: RenderJob) -> Result<PathBuf> {
        if job.segments.is_empty() {
            anyhow::bail!("no segments to render");
        }

        fs::create_dir_all(&self.scratch_root)
            .await
            .with_context(|| format!("Failed to create dir {}", self.scratch_root.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("render-{}-", job.id))
            .tempdir_in(&self.scratch_root)
            .context("create scratch dir")?;

        logi(format!("Composing {} segment(s) for {}", job.segments.len(), job.id));
        let mut parts = Vec::with_capacity(job.segments.len());
        for (i, segment) in job.segments.iter().enumerate() {
            let part = scratch.path().join(format!("seg_{i:03}.mp4"));
            self.composer
                .compose(&segment.source, segment.duration, &part)
                .await?;
            parts.push(part);
        }

        let list_txt = scratch.path().join("concat.txt");
        fs::write(&list_txt, concat_list(&parts))
            .await
            .context("write concat list")?;

        let audio = scratch.path().join("narration.m4a");
        if !ffmpeg::ffmpeg_narration_to_aac(&job.narration.path, &audio).await? {
            anyhow::bail!("narration transcode produced no file");
        }

        let out_dir = job
            .output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&out_dir)
            .await
            .with_context(|| format!("Failed to create dir {}", out_dir.display()))?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}-", job.id))
            .suffix(".mp4")
            .tempfile_in(&out_dir)
            .context("create temp output")?;

        let made = ffmpeg::ffmpeg_concat_with_audio(&list_txt, &audio, &self.encode, tmp.path()).await?;
        let written = fs::metadata(tmp.path()).await.map(|m| m.len() > 0).unwrap_or(false);
        if !made || !written {
            anyhow::bail!("final encode produced no output");
        }

        tmp.persist(&job.output_path)
            .map_err(|e| anyhow::anyhow!("persist {}: {}", job.output_path.display(), e.error))?;
        logok(format!("Rendered {}", job.output_path.display()));
        Ok(job.output_path)
    }
}
