use crate::api::pexels::PexelsClient;
use crate::captions;
use crate::clip_plan::{ClipSource, plan_segments};
use crate::config::Config;
use crate::fetcher::{ClipCache, ClipDownloader, ClipFetcher, FootageSearch};
use crate::init;
use crate::query::{QueryTables, derive_queries};
use crate::render::{RenderJob, Renderer, output_path_for};
use crate::script::{Script, load_scripts};
use crate::tts::{self, SpeechSynthesizer};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const REPORT_FILE: &str = "batch_report.json";

/// What one successful script produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    pub video: PathBuf,
    pub captions: Option<PathBuf>,
    pub clips: usize,
    pub synthetic_background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    Rendered,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub id: String,
    pub status: ScriptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions: Option<PathBuf>,
    pub clips: usize,
    pub synthetic_background: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub scripts: Vec<ScriptReport>,
}

impl BatchReport {
    fn new(started_at: DateTime<Utc>, scripts: Vec<ScriptReport>) -> Self {
        let count = |status: ScriptStatus| scripts.iter().filter(|r| r.status == status).count();
        Self {
            started_at,
            finished_at: Utc::now(),
            rendered: count(ScriptStatus::Rendered),
            skipped: count(ScriptStatus::Skipped),
            failed: count(ScriptStatus::Failed),
            scripts,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 { 0 } else { 1 }
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize batch report")?;
        fs::write(path, json)
            .await
            .with_context(|| format!("write batch report: {}", path.display()))
    }
}

/// Turns one script at a time into a finished video.
pub struct Pipeline {
    cfg: Config,
    tables: QueryTables,
    search: Box<dyn FootageSearch>,
    downloader: ClipDownloader,
    synth: Option<Box<dyn SpeechSynthesizer>>,
    renderer: Renderer,
}

impl Pipeline {
    pub fn new(
        cfg: Config,
        tables: QueryTables,
        search: Box<dyn FootageSearch>,
        downloader: ClipDownloader,
        synth: Option<Box<dyn SpeechSynthesizer>>,
    ) -> Self {
        let renderer = Renderer::new(cfg.media_dir.join("work"));
        Self {
            cfg,
            tables,
            search,
            downloader,
            synth,
            renderer,
        }
    }

    pub async fn from_config(cfg: Config, client: reqwest::Client) -> Result<Self> {
        let tables = match &cfg.query_tables {
            Some(path) => QueryTables::load_with_overrides(path).await?,
            None => QueryTables::builtin().clone(),
        };
        let search = PexelsClient::new(client.clone(), cfg.pexels_base_url.clone(), cfg.pexels_key.clone());
        let downloader = ClipDownloader::new(client.clone(), ClipCache::new(cfg.media_dir.clone()));
        let synth = tts::synthesizer_from_config(&cfg, client);
        Ok(Self::new(cfg, tables, Box::new(search), downloader, Some(synth)))
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub async fn process_script(&self, script: &Script) -> Result<ScriptOutput> {
        let narration = tts::prepare_narration(self.synth.as_deref(), script, &self.cfg.audio_dir).await?;
        logok(format!("Narration {:.2}s: {}", narration.duration, narration.path.display()));

        let queries = derive_queries(
            &script.body,
            script.channel_code.as_deref(),
            &script.language,
            script.image_query.as_deref(),
            &self.tables,
        );
        logi(format!("Queries for {}: {:?}", script.id, queries));

        let fetcher = ClipFetcher::new(self.search.as_ref(), &self.downloader);
        let clips = fetcher.fetch_clips(&queries, self.cfg.segments).await;
        if clips.is_empty() {
            logw(format!("No clips for {}; using solid background", script.id));
        } else {
            logok(format!("Got {} clip(s) for {}", clips.len(), script.id));
        }

        let sources = ClipSource::from_clips(&clips);
        let paragraphs = script.paragraphs();
        let segments = plan_segments(narration.duration, &paragraphs, &sources);
        if let Ok(plan) = serde_json::to_string(&segments) {
            tracing::debug!(id = %script.id, %plan, "segment plan");
        }
        let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();

        let video = self
            .renderer
            .render(RenderJob {
                id: script.id.clone(),
                segments,
                narration,
                output_path: output_path_for(&self.cfg.output_dir, &script.id),
            })
            .await?;

        let captions = if self.cfg.burn_captions {
            let entries = captions::build_captions(&paragraphs, &durations);
            let srt_path = captions::write_captions(&entries, &video).await?;
            captions::burn_in(&script.id, &video, &srt_path, &self.renderer.encode).await?;
            Some(srt_path)
        } else {
            None
        };

        Ok(ScriptOutput {
            video,
            captions,
            clips: clips.len(),
            synthetic_background: sources.iter().all(ClipSource::is_synthetic),
        })
    }

    /// Runs every script in order. A failing script is recorded and the
    /// batch moves on.
    pub async fn run_batch(&self, scripts: &[Script]) -> BatchReport {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(scripts.len());

        for script in scripts {
            let script_started = Utc::now();
            let mut report = ScriptReport {
                id: script.id.clone(),
                status: ScriptStatus::Skipped,
                output: None,
                captions: None,
                clips: 0,
                synthetic_background: false,
                error: None,
                started_at: script_started,
                finished_at: script_started,
            };

            let out = output_path_for(&self.cfg.output_dir, &script.id);
            if fs::metadata(&out).await.is_ok() {
                logi(format!("Skipping {} (already rendered)", script.id));
                report.output = Some(out);
                reports.push(report);
                continue;
            }

            logi(format!("=== Processing: {} ===", script.id));
            match self.process_script(script).await {
                Ok(output) => {
                    logok(format!("DONE: {}", script.id));
                    report.status = ScriptStatus::Rendered;
                    report.output = Some(output.video);
                    report.captions = output.captions;
                    report.clips = output.clips;
                    report.synthetic_background = output.synthetic_background;
                }
                Err(err) => {
                    logw(format!("FAILED: {}: {:#}", script.id, err));
                    report.status = ScriptStatus::Failed;
                    report.error = Some(format!("{err:#}"));
                }
            }
            report.finished_at = Utc::now();
            reports.push(report);
        }

        BatchReport::new(started_at, reports)
    }
}

pub async fn run_generation(config_path: &Path) -> Result<i32> {
    let cfg = Config::load(config_path).await?;
    init::ensure_directories(&cfg).await?;
    if !init::check_ffmpeg().await {
        anyhow::bail!("ffmpeg and ffprobe must be installed and on PATH");
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let scripts = load_scripts(&cfg.scripts_dir, &cfg.scripts_csv).await?;
    logi(format!("Loaded {} script(s)", scripts.len()));

    let pipeline = Pipeline::from_config(cfg, client).await?;
    let report = pipeline.run_batch(&scripts).await;

    let report_path = pipeline.config().output_dir.join(REPORT_FILE);
    report.write(&report_path).await?;
    logi(format!(
        "All done. Rendered: {}, skipped: {}, failed: {} (report: {})",
        report.rendered,
        report.skipped,
        report.failed,
        report_path.display()
    ));
    Ok(report.exit_code())
}
