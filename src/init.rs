use crate::config::Config;
use crate::logi;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

fn required_dirs(cfg: &Config) -> Vec<PathBuf> {
    let mut dirs = vec![
        cfg.scripts_dir.clone(),
        cfg.audio_dir.clone(),
        cfg.output_dir.clone(),
        cfg.media_dir.clone(),
    ];
    if let Some(parent) = cfg.scripts_csv.parent().filter(|p| !p.as_os_str().is_empty()) {
        dirs.push(parent.to_path_buf());
    }
    dirs.dedup();
    dirs
}

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in required_dirs(cfg) {
        if fs::metadata(&dir).await.is_err() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create dir {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    for tool in ["ffmpeg", "ffprobe"] {
        let ok = match tokio::process::Command::new(tool).arg("-version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        };
        if !ok {
            return false;
        }
    }
    true
}
