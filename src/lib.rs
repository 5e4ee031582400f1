pub mod allocate;
pub mod api;
pub mod captions;
pub mod clip_plan;
pub mod compose;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod fetcher;
pub mod generator;
pub mod init;
pub mod query;
pub mod render;
pub mod retry;
pub mod script;
pub mod srt;
pub mod tts;

pub(crate) fn logi(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    tracing::info!(status = "ok", "{}", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}
