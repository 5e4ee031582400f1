use crate::error::Unavailable;
use crate::fetcher::{ClipCandidate, FootageAsset, FootageSearch};
use crate::logw;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const MAX_PAGE_SIZE: usize = 80;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    link: Option<String>,
}

/// Client for a Pexels-compatible `/videos/search` endpoint.
pub struct PexelsClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl PexelsClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::new("footage search").with_max_attempts(2),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn search_once(&self, query: &str, per_page: usize) -> Result<Vec<FootageAsset>, Unavailable> {
        let url = format!("{}/videos/search", self.base_url);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE).to_string();

        let resp = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", "portrait"),
            ])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;
        if !status.is_success() {
            if !raw.is_empty() {
                let snippet = raw.chars().take(200).collect::<String>();
                logw(format!("Footage search HTTP {} for {:?}: {}", status.as_u16(), query, snippet));
            }
            return Err(Unavailable::Status(status.as_u16()));
        }

        let parsed: SearchResponse =
            serde_json::from_str(&raw).map_err(|e| Unavailable::Malformed(e.to_string()))?;
        Ok(parsed.videos.into_iter().map(to_asset).collect())
    }
}

fn to_asset(video: PexelsVideo) -> FootageAsset {
    let files = video
        .video_files
        .into_iter()
        .filter_map(|f| {
            Some(ClipCandidate {
                url: f.link?,
                width: f.width.unwrap_or(0),
                height: f.height.unwrap_or(0),
            })
        })
        .collect();
    FootageAsset { id: video.id, files }
}

#[async_trait]
impl FootageSearch for PexelsClient {
    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<FootageAsset>, Unavailable> {
        if self.api_key.trim().is_empty() {
            return Err(Unavailable::MissingCredential);
        }
        let query = query.trim();
        self.retry.run(move || self.search_once(query, per_page)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_keep_only_linked_files() {
        let body = r#"{"videos":[{"id":7,"video_files":[
            {"width":1080,"height":1920,"link":"https://cdn/x-hd.mp4"},
            {"width":640,"height":360},
            {"link":"https://cdn/x-unknown.mp4"}
        ]}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        let assets: Vec<_> = parsed.videos.into_iter().map(to_asset).collect();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, 7);
        assert_eq!(assets[0].files.len(), 2);
        assert_eq!(assets[0].files[1].width, 0);
    }

    #[test]
    fn body_without_videos_is_malformed() {
        assert!(serde_json::from_str::<SearchResponse>(r#"{"page":1}"#).is_err());
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let client = PexelsClient::new(Client::new(), "http://127.0.0.1:9", "  ");
        let err = client.search("ocean", 6).await.unwrap_err();
        assert_eq!(err, Unavailable::MissingCredential);
    }
}
