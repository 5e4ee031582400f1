use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_SEGMENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Google,
    ElevenLabs,
}

impl TtsProvider {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" | "gtts" => Some(TtsProvider::Google),
            "elevenlabs" | "eleven" => Some(TtsProvider::ElevenLabs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "pexels_api_key")]
    pub pexels_key: String,
    pub pexels_base_url: String,
    pub segments: usize,
    pub burn_captions: bool,
    pub tts_provider: TtsProvider,
    #[serde(rename = "elevenlabs_api_key")]
    pub elevenlabs_key: String,
    pub eleven_voice_id: String,
    pub eleven_model_id: String,
    pub scripts_dir: PathBuf,
    pub scripts_csv: PathBuf,
    pub audio_dir: PathBuf,
    pub output_dir: PathBuf,
    pub media_dir: PathBuf,
    pub query_tables: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pexels_key: String::new(),
            pexels_base_url: "https://api.pexels.com".to_string(),
            segments: DEFAULT_SEGMENTS,
            burn_captions: false,
            tts_provider: TtsProvider::Google,
            elevenlabs_key: String::new(),
            eleven_voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            eleven_model_id: "eleven_multilingual_v2".to_string(),
            scripts_dir: PathBuf::from("input/scripts"),
            scripts_csv: PathBuf::from("input/scripts.csv"),
            audio_dir: PathBuf::from("output/audio"),
            output_dir: PathBuf::from("output/final"),
            media_dir: PathBuf::from("input/media_temp"),
            query_tables: None,
        }
    }
}

impl Config {
    /// Reads the optional JSON file at `path`, then applies environment
    /// overrides. A missing file is not an error.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("PEXELS_API_KEY") {
            self.pexels_key = v;
        }
        if let Some(v) = var("PEXELS_BASE_URL") {
            self.pexels_base_url = v;
        }
        if let Some(n) = var("SEGMENTS").and_then(|v| v.parse::<usize>().ok()) {
            self.segments = n;
        }
        if let Some(v) = var("BURN_CAPTIONS") {
            self.burn_captions = parse_flag(&v);
        }
        if let Some(p) = var("TTS_PROVIDER").and_then(|v| TtsProvider::parse(&v)) {
            self.tts_provider = p;
        }
        if let Some(v) = var("ELEVENLABS_API_KEY") {
            self.elevenlabs_key = v;
        }
        if let Some(v) = var("ELEVEN_VOICE_ID") {
            self.eleven_voice_id = v;
        }
        if let Some(v) = var("ELEVEN_MODEL_ID") {
            self.eleven_model_id = v;
        }
        if let Some(v) = var("SCRIPTS_DIR") {
            self.scripts_dir = PathBuf::from(v);
        }
        if let Some(v) = var("SCRIPTS_CSV") {
            self.scripts_csv = PathBuf::from(v);
        }
        if let Some(v) = var("AUDIO_DIR") {
            self.audio_dir = PathBuf::from(v);
        }
        if let Some(v) = var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("MEDIA_DIR") {
            self.media_dir = PathBuf::from(v);
        }
        if let Some(v) = var("QUERY_TABLES") {
            self.query_tables = Some(PathBuf::from(v));
        }

        self.segments = self.segments.max(1);
    }

    pub fn validate(&self) -> Result<()> {
        if self.tts_provider == TtsProvider::ElevenLabs && self.elevenlabs_key.is_empty() {
            anyhow::bail!("TTS_PROVIDER=elevenlabs requires ELEVENLABS_API_KEY");
        }
        if self.pexels_base_url.is_empty() {
            anyhow::bail!("PEXELS_BASE_URL must not be empty");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_surface() {
        let cfg = Config::default();
        assert_eq!(cfg.segments, 3);
        assert!(!cfg.burn_captions);
        assert_eq!(cfg.tts_provider, TtsProvider::Google);
        assert!(cfg.pexels_key.is_empty());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("PEXELS_API_KEY", " abc "),
            ("SEGMENTS", "5"),
            ("BURN_CAPTIONS", "yes"),
            ("OUTPUT_DIR", "/tmp/out"),
        ]));
        assert_eq!(cfg.pexels_key, "abc");
        assert_eq!(cfg.segments, 5);
        assert!(cfg.burn_captions);
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn zero_or_garbage_segments_are_sanitized() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("SEGMENTS", "0")]));
        assert_eq!(cfg.segments, 1);

        let mut cfg = Config::default();
        cfg.apply_env(env(&[("SEGMENTS", "many")]));
        assert_eq!(cfg.segments, DEFAULT_SEGMENTS);
    }

    #[test]
    fn elevenlabs_without_key_is_rejected() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("TTS_PROVIDER", "elevenlabs")]));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"pexels_api_key":"k","segments":2}"#).unwrap();
        assert_eq!(cfg.pexels_key, "k");
        assert_eq!(cfg.segments, 2);
        assert_eq!(cfg.output_dir, PathBuf::from("output/final"));
    }
}
