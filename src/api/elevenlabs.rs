use crate::error::Unavailable;
use crate::logw;
use crate::retry::RetryPolicy;
use crate::tts::SpeechSynthesizer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ElevenLabs {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    base_url: String,
    retry: RetryPolicy,
}

impl ElevenLabs {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            base_url: "https://api.elevenlabs.io".to_string(),
            retry: RetryPolicy::new("elevenlabs tts"),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, text: &str, language: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });
        let lang = language.split(['-', '_']).next().unwrap_or("").trim();
        if !lang.is_empty() {
            body["language_code"] = serde_json::Value::String(lang.to_ascii_lowercase());
        }
        body
    }

    async fn post_once(&self, text: &str, language: &str) -> Result<Vec<u8>, Unavailable> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.base_url, self.voice_id
        );

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&self.request_body(text, language))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Unavailable::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabs {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, language: &str, out_mp3_path: &Path) -> Result<bool> {
        let bytes = match self.retry.run(move || self.post_once(text, language)).await {
            Ok(bytes) => bytes,
            Err(Unavailable::Status(code)) => {
                logw(format!("ElevenLabs TTS failed HTTP {code}"));
                return Ok(false);
            }
            Err(err) => return Err(err).context("ElevenLabs request failed"),
        };

        if let Some(parent) = out_mp3_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_mp3_path, &bytes).await?;

        Ok(fs::metadata(out_mp3_path).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ElevenLabs {
        ElevenLabs::new(Client::new(), "secret", "voice1", "model1").with_base_url(server.uri())
    }

    #[test]
    fn body_carries_base_language_code() {
        let tts = ElevenLabs::new(Client::new(), "k", "v", "m");
        let body = tts.request_body("hello", "hi-IN");
        assert_eq!(body["language_code"], "hi");
        assert_eq!(body["model_id"], "m");
    }

    #[tokio::test]
    async fn writes_audio_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice1"))
            .and(header("xi-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("audio/s1.mp3");
        assert!(client(&server).synthesize("Hello", "en", &out).await.unwrap());
        assert_eq!(std::fs::read(&out).unwrap(), b"ID3fake");
    }

    #[tokio::test]
    async fn http_failure_reports_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("s1.mp3");
        assert!(!client(&server).synthesize("Hello", "en", &out).await.unwrap());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn server_error_is_retried_before_giving_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3retry".to_vec()))
            .mount(&server)
            .await;

        let tts = client(&server).with_retry(
            RetryPolicy::new("elevenlabs tts")
                .with_base_delay(Duration::from_millis(5))
                .with_jitter(0.0),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("s1.mp3");
        assert!(tts.synthesize("Hello", "en", &out).await.unwrap());
        assert_eq!(std::fs::read(&out).unwrap(), b"ID3retry");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}
