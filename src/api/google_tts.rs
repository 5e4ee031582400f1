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

/// The endpoint rejects longer inputs.
pub const MAX_CHUNK_CHARS: usize = 100;
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

/// Keyless speech through the Google Translate read-aloud endpoint.
/// Text is sent in short chunks and the MP3 responses are concatenated.
pub struct GoogleTts {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GoogleTts {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://translate.google.com".to_string(),
            retry: RetryPolicy::new("google tts chunk"),
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

    async fn fetch_chunk(&self, chunk: &str, lang: &str, idx: usize, total: usize) -> Result<Vec<u8>, Unavailable> {
        let url = format!("{}/translate_tts", self.base_url);
        let idx = idx.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();

        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", chunk),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Unavailable::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Splits text into pieces of at most `max_chars` characters, preferring
/// sentence ends, then clause marks, then spaces. Words longer than the limit
/// are hard-split.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.split_whitespace().collect::<Vec<_>>().join(" ").chars().collect();

    while !rest.is_empty() {
        if rest.len() <= max_chars {
            chunks.push(rest.iter().collect::<String>());
            break;
        }

        let window = &rest[..=max_chars.min(rest.len() - 1)];
        let cut = find_break(window, &['.', '!', '?', '।', '\n'])
            .or_else(|| find_break(window, &[',', ';', ':']))
            .or_else(|| window[..max_chars].iter().rposition(|c| *c == ' ').filter(|&i| i > 0))
            .unwrap_or(max_chars);

        let piece: String = rest[..cut].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        rest = rest[cut..].iter().collect::<String>().trim_start().chars().collect();
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Position just after the last punctuation mark in `window` (excluding
/// the final look-ahead slot), if any.
fn find_break(window: &[char], marks: &[char]) -> Option<usize> {
    let limit = window.len().saturating_sub(1);
    window[..limit]
        .iter()
        .rposition(|c| marks.contains(c))
        .map(|i| i + 1)
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str, language: &str, out_mp3_path: &Path) -> Result<bool> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            logw("Google TTS: nothing to speak");
            return Ok(false);
        }

        let lang = language.split(['-', '_']).next().unwrap_or("en").to_ascii_lowercase();
        let lang = lang.as_str();
        let total = chunks.len();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            match self.retry.run(move || self.fetch_chunk(chunk, lang, idx, total)).await {
                Ok(bytes) => audio.extend_from_slice(&bytes),
                Err(Unavailable::Status(code)) => {
                    logw(format!("Google TTS chunk {idx} failed HTTP {code}"));
                    return Ok(false);
                }
                Err(err) => return Err(err).context("Google TTS request failed"),
            }
        }

        if let Some(parent) = out_mp3_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_mp3_path, &audio).await?;
        Ok(fs::metadata(out_mp3_path).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  Hello   world. ", 100), vec!["Hello world."]);
        assert!(chunk_text("   ", 100).is_empty());
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "First sentence here. Second sentence is a bit longer than the first one.";
        let chunks = chunk_text(text, 40);
        assert_eq!(chunks[0], "First sentence here.");
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn falls_back_to_spaces_then_hard_split() {
        let chunks = chunk_text("alpha beta gamma delta", 11);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);

        let long = "x".repeat(25);
        let chunks = chunk_text(&long, 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn counts_characters_for_devanagari() {
        let text = "मंदिर में दीप जले। ".repeat(10);
        for chunk in chunk_text(&text, 30) {
            assert!(chunk.chars().count() <= 30);
        }
    }

    #[tokio::test]
    async fn concatenates_chunk_audio() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("tl", "hi"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let tts = GoogleTts::new(Client::new()).with_base_url(server.uri());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.mp3");
        let text = format!("{}. {}.", "a".repeat(60), "b".repeat(60));
        assert!(tts.synthesize(&text, "hi-IN", &out).await.unwrap());
        assert_eq!(std::fs::read(&out).unwrap(), b"mp3mp3");
    }

    #[tokio::test]
    async fn unavailable_chunk_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .mount(&server)
            .await;

        let tts = GoogleTts::new(Client::new()).with_base_url(server.uri()).with_retry(
            RetryPolicy::new("google tts chunk")
                .with_base_delay(Duration::from_millis(5))
                .with_jitter(0.0),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.mp3");
        assert!(tts.synthesize("Hello there.", "en", &out).await.unwrap());
        assert_eq!(std::fs::read(&out).unwrap(), b"mp3");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejected_chunk_reports_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let tts = GoogleTts::new(Client::new()).with_base_url(server.uri());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.mp3");
        assert!(!tts.synthesize("Hello there.", "en", &out).await.unwrap());
        assert!(!out.exists());
    }
}
