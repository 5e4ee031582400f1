//! Background clip retrieval.
//!
//! Walks the query list against a footage search backend, picks one file
//! variant per asset (portrait first, then highest resolution) and downloads
//! the picks into a content-addressed cache. Every external failure degrades
//! to "fewer clips"; an empty result is a valid outcome.

use crate::error::Unavailable;
use crate::ffmpeg;
use crate::query::QueryList;
use crate::retry::RetryPolicy;
use crate::{logi, logok, logw};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

pub const SAFETY_QUERIES: &[&str] = &["nature landscape vertical", "abstract background loop"];
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One encoded file variant of a footage asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipCandidate {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl ClipCandidate {
    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootageAsset {
    pub id: u64,
    pub files: Vec<ClipCandidate>,
}

/// A clip available on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalClip {
    pub url: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait FootageSearch: Send + Sync {
    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<FootageAsset>, Unavailable>;
}

/// Best variant of an asset: portrait before landscape, then by height and width.
pub fn pick_variant(files: &[ClipCandidate]) -> Option<ClipCandidate> {
    let mut eligible: Vec<&ClipCandidate> = files
        .iter()
        .filter(|f| f.url.starts_with("http://") || f.url.starts_with("https://"))
        .collect();
    eligible.sort_by(|a, b| {
        b.is_portrait()
            .cmp(&a.is_portrait())
            .then_with(|| b.height.cmp(&a.height))
            .then_with(|| b.width.cmp(&a.width))
    });
    eligible.first().map(|c| (*c).clone())
}

pub fn page_size_for(need: usize) -> usize {
    (need * 3).max(6).min(crate::api::pexels::MAX_PAGE_SIZE)
}

/// On-disk clip store keyed by the SHA-256 of the source URL.
#[derive(Debug, Clone)]
pub struct ClipCache {
    dir: PathBuf,
}

impl ClipCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_for(url: &str) -> String {
        format!("{:x}", Sha256::digest(url.trim().as_bytes()))
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.mp4", Self::key_for(url)))
    }

    pub async fn lookup(&self, url: &str) -> Option<PathBuf> {
        let path = self.path_for(url);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
            _ => None,
        }
    }

    pub async fn evict(&self, url: &str) {
        let _ = fs::remove_file(self.path_for(url)).await;
    }

    /// Temp file inside the cache directory; removed on drop unless committed.
    async fn partial(&self) -> Result<NamedTempFile, Unavailable> {
        fs::create_dir_all(&self.dir).await?;
        Ok(tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(".mp4")
            .tempfile_in(&self.dir)?)
    }

    /// Moves a finished download into place, so entries appear complete or not at all.
    fn commit(&self, url: &str, tmp: NamedTempFile) -> Result<PathBuf, Unavailable> {
        let dest = self.path_for(url);
        tmp.persist(&dest).map_err(|e| Unavailable::Io(e.error.to_string()))?;
        Ok(dest)
    }
}

/// How a clip file is vetted before it is handed to the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipCheck {
    /// `ffprobe` has to read a positive duration.
    Readable,
    /// Any non-empty file passes.
    NonEmpty,
}

impl ClipCheck {
    async fn verify(self, path: &Path) -> Result<(), Unavailable> {
        match self {
            ClipCheck::NonEmpty => Ok(()),
            ClipCheck::Readable => ffmpeg::ffprobe_duration_seconds(path)
                .await
                .map(|_| ())
                .map_err(|e| Unavailable::Malformed(format!("unreadable clip: {e:#}"))),
        }
    }
}

pub struct ClipDownloader {
    client: reqwest::Client,
    cache: ClipCache,
    retry: RetryPolicy,
    check: ClipCheck,
    idle_timeout: Duration,
}

impl ClipDownloader {
    pub fn new(client: reqwest::Client, cache: ClipCache) -> Self {
        Self {
            client,
            cache,
            retry: RetryPolicy::new("clip download"),
            check: ClipCheck::Readable,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_check(mut self, check: ClipCheck) -> Self {
        self.check = check;
        self
    }

    /// Longest wait for response headers or for the next body chunk.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn cache(&self) -> &ClipCache {
        &self.cache
    }

    /// Local path for `url`, downloading it on a cache miss. Files that fail
    /// the clip check never stay in the cache.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, Unavailable> {
        if let Some(path) = self.cache.lookup(url).await {
            match self.check.verify(&path).await {
                Ok(()) => {
                    logi(format!("Clip cache hit: {}", path.display()));
                    return Ok(path);
                }
                Err(err) => {
                    logw(format!("Dropping cached clip {} ({})", path.display(), err));
                    self.cache.evict(url).await;
                }
            }
        }

        let tmp = self.retry.run(move || self.download_once(url)).await?;
        self.check.verify(tmp.path()).await?;
        let path = self.cache.commit(url, tmp)?;
        logok(format!("Downloaded clip -> {}", path.display()));
        Ok(path)
    }

    async fn download_once(&self, url: &str) -> Result<NamedTempFile, Unavailable> {
        let stalled = |what: &str| Unavailable::Transport(format!("{what} timed out for {url}"));

        let mut resp = timeout(self.idle_timeout, self.client.get(url).send())
            .await
            .map_err(|_| stalled("response"))??;
        let status = resp.status();
        if !status.is_success() {
            return Err(Unavailable::Status(status.as_u16()));
        }

        let tmp = self.cache.partial().await?;
        let mut file = fs::File::from_std(tmp.as_file().try_clone()?);
        let mut written = 0usize;
        while let Some(chunk) = timeout(self.idle_timeout, resp.chunk())
            .await
            .map_err(|_| stalled("body read"))??
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        file.sync_all().await?;

        if written == 0 {
            return Err(Unavailable::Malformed("empty clip body".to_string()));
        }
        Ok(tmp)
    }
}

pub struct ClipFetcher<'a> {
    search: &'a dyn FootageSearch,
    downloader: &'a ClipDownloader,
    safety_queries: Vec<String>,
}

impl<'a> ClipFetcher<'a> {
    pub fn new(search: &'a dyn FootageSearch, downloader: &'a ClipDownloader) -> Self {
        Self {
            search,
            downloader,
            safety_queries: SAFETY_QUERIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Up to `need` local clips. Never fails; an empty vector means the caller
    /// should fall back to a synthetic background.
    pub async fn fetch_clips(&self, queries: &[String], need: usize) -> Vec<LocalClip> {
        if need == 0 {
            return Vec::new();
        }

        let picks = self.collect_candidates(queries, need).await;
        let mut clips = Vec::with_capacity(picks.len());
        for pick in picks {
            match self.downloader.fetch(&pick.url).await {
                Ok(path) => clips.push(LocalClip {
                    url: pick.url,
                    path,
                    width: pick.width,
                    height: pick.height,
                }),
                Err(err) => logw(format!("Clip unavailable ({}): {}", err, pick.url)),
            }
        }
        clips
    }

    /// Searches queries in order, then the safety queries, until `need`
    /// distinct URLs are picked.
    pub async fn collect_candidates(&self, queries: &[String], need: usize) -> Vec<ClipCandidate> {
        let per_page = page_size_for(need);
        let mut picked = Vec::new();
        let mut seen_urls = HashSet::new();
        let mut tried = QueryList::new();

        let safety = self.safety_queries.iter();
        for (is_safety, query) in queries.iter().map(|q| (false, q)).chain(safety.map(|q| (true, q))) {
            if picked.len() >= need {
                break;
            }
            if !tried.push(query) {
                continue;
            }
            if is_safety {
                logi(format!("Only {}/{} clips so far; trying safety query {:?}", picked.len(), need, query));
            }

            let assets = match self.search.search(query, per_page).await {
                Ok(assets) => assets,
                Err(Unavailable::MissingCredential) => {
                    logw("No footage API key configured; skipping clip search.");
                    break;
                }
                Err(err) => {
                    logw(format!("Footage search for {:?} unavailable: {}", query, err));
                    continue;
                }
            };

            let before = picked.len();
            for asset in assets {
                let Some(pick) = pick_variant(&asset.files) else {
                    continue;
                };
                if !seen_urls.insert(pick.url.clone()) {
                    continue;
                }
                picked.push(pick);
                if picked.len() >= need {
                    break;
                }
            }
            logi(format!("Query {:?} contributed {} clip(s)", query, picked.len() - before));
        }

        picked
    }
}
