use crate::api::{elevenlabs::ElevenLabs, google_tts::GoogleTts};
use crate::config::{Config, TtsProvider};
use crate::error::PipelineError;
use crate::ffmpeg;
use crate::script::Script;
use crate::{logi, logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Text-to-speech backend. Writes an MP3 to `out_mp3_path`; `Ok(false)` means
/// the service answered but produced no audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, language: &str, out_mp3_path: &Path) -> Result<bool>;
}

pub fn synthesizer_from_config(cfg: &Config, client: reqwest::Client) -> Box<dyn SpeechSynthesizer> {
    match cfg.tts_provider {
        TtsProvider::Google => Box::new(GoogleTts::new(client)),
        TtsProvider::ElevenLabs => Box::new(ElevenLabs::new(
            client,
            cfg.elevenlabs_key.clone(),
            cfg.eleven_voice_id.clone(),
            cfg.eleven_model_id.clone(),
        )),
    }
}

/// Synthesized speech for one script.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationAudio {
    pub path: PathBuf,
    pub duration: f64,
}

impl NarrationAudio {
    pub async fn open(path: &Path) -> Result<Self> {
        if fs::metadata(path).await.is_err() {
            return Err(PipelineError::MissingNarration(path.to_path_buf()).into());
        }
        let duration = ffmpeg::ffprobe_duration_seconds(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            duration,
        })
    }
}

pub fn narration_path(audio_dir: &Path, script_id: &str) -> PathBuf {
    audio_dir.join(format!("{script_id}.mp3"))
}

/// Reuses `<audio_dir>/<id>.mp3` when present, otherwise synthesizes it.
pub async fn prepare_narration(
    synth: Option<&dyn SpeechSynthesizer>,
    script: &Script,
    audio_dir: &Path,
) -> Result<NarrationAudio> {
    let path = narration_path(audio_dir, &script.id);

    if fs::metadata(&path).await.map(|m| m.len() > 0).unwrap_or(false) {
        logok(format!("Using existing narration: {}", path.display()));
        return NarrationAudio::open(&path).await;
    }

    let Some(synth) = synth else {
        return Err(PipelineError::MissingNarration(path).into());
    };

    logi(format!(
        "TTS ({}, {}) -> {}",
        synth.name(),
        script.language,
        path.display()
    ));
    match synth.synthesize(&script.body, &script.language, &path).await {
        Ok(true) => {}
        Ok(false) => {
            let _ = fs::remove_file(&path).await;
            return Err(PipelineError::MissingNarration(path).into());
        }
        Err(err) => {
            logw(format!("TTS failed for {}: {:#}", script.id, err));
            let _ = fs::remove_file(&path).await;
            return Err(PipelineError::MissingNarration(path).into());
        }
    }

    NarrationAudio::open(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentTts;

    #[async_trait]
    impl SpeechSynthesizer for SilentTts {
        fn name(&self) -> &str {
            "silent"
        }

        async fn synthesize(&self, _text: &str, _language: &str, _out: &Path) -> Result<bool> {
            Ok(false)
        }
    }

    fn is_missing_narration(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingNarration(_))
        )
    }

    #[test]
    fn narration_file_is_named_by_script_id() {
        assert_eq!(
            narration_path(Path::new("output/audio"), "s-01"),
            PathBuf::from("output/audio/s-01.mp3")
        );
    }

    #[tokio::test]
    async fn absent_audio_without_synthesizer_is_missing_narration() {
        let dir = tempfile::tempdir().unwrap();
        let script = Script::new("s1", "Hello");
        let err = prepare_narration(None, &script, dir.path()).await.unwrap_err();
        assert!(is_missing_narration(&err));
    }

    #[tokio::test]
    async fn synthesizer_without_audio_is_missing_narration() {
        let dir = tempfile::tempdir().unwrap();
        let script = Script::new("s1", "Hello");
        let err = prepare_narration(Some(&SilentTts), &script, dir.path())
            .await
            .unwrap_err();
        assert!(is_missing_narration(&err));
    }

    #[test]
    fn provider_selection_follows_config() {
        let mut cfg = Config::default();
        assert_eq!(synthesizer_from_config(&cfg, reqwest::Client::new()).name(), "google");
        cfg.tts_provider = TtsProvider::ElevenLabs;
        cfg.elevenlabs_key = "k".into();
        assert_eq!(synthesizer_from_config(&cfg, reqwest::Client::new()).name(), "elevenlabs");
    }
}
