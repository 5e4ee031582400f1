use crate::allocate::MIN_SEGMENT_SECONDS;
use crate::clip_plan::ClipSource;
use crate::ffmpeg::{self, VideoEncode};
use anyhow::{Context, Result};
use std::path::Path;

/// Output frame geometry shared by every segment and the final render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

impl FrameSpec {
    pub fn frames_for(&self, duration_s: f64) -> u64 {
        ((duration_s * self.fps as f64).round() as u64).max(1)
    }
}

/// Normalizes each timeline entry into a standalone vertical clip.
#[derive(Debug, Clone)]
pub struct SegmentComposer {
    pub frame: FrameSpec,
    /// Scale reached at the end of a segment; 1.0 disables the zoom.
    pub zoom_end: f64,
    pub encode: VideoEncode,
}

impl Default for SegmentComposer {
    fn default() -> Self {
        let frame = FrameSpec::default();
        Self {
            frame,
            zoom_end: 1.02,
            encode: VideoEncode::intermediate(frame.fps),
        }
    }
}

impl SegmentComposer {
    /// Input side of the ffmpeg call. Files loop forever and are cut by `-t`,
    /// which covers both the loop-to-fill and the trim case.
    pub fn input_args(&self, source: &ClipSource) -> Vec<String> {
        match source {
            ClipSource::File { path } => vec![
                "-stream_loop".to_string(),
                "-1".to_string(),
                "-i".to_string(),
                path.display().to_string(),
            ],
            ClipSource::Solid { rgb: (r, g, b) } => vec![
                "-f".to_string(),
                "lavfi".to_string(),
                "-i".to_string(),
                format!(
                    "color=c=0x{:02X}{:02X}{:02X}:s={}x{}:r={}",
                    r, g, b, self.frame.width, self.frame.height, self.frame.fps
                ),
            ],
        }
    }

    /// Cover-scale, center-crop, then a linear zoom from 1.0 to `zoom_end`
    /// over the segment's frames.
    pub fn filter(&self, duration_s: f64) -> String {
        let FrameSpec { width, height, fps } = self.frame;
        let frames = self.frame.frames_for(duration_s);
        let step = (self.zoom_end - 1.0).max(0.0);

        let mut chain = format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps}",
            w = width,
            h = height,
            fps = fps
        );
        if step > 0.0 {
            chain.push_str(&format!(
                ",zoompan=z='1+{step:.4}*on/{frames}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={w}x{h}:fps={fps}",
                step = step,
                frames = frames,
                w = width,
                h = height,
                fps = fps
            ));
        }
        chain.push_str(",format=yuv420p");
        chain
    }

    pub async fn compose(&self, source: &ClipSource, duration_s: f64, out_mp4: &Path) -> Result<()> {
        let duration_s = duration_s.max(MIN_SEGMENT_SECONDS);
        let made = ffmpeg::ffmpeg_encode_segment(
            &self.input_args(source),
            &self.filter(duration_s),
            duration_s,
            &self.encode,
            out_mp4,
        )
        .await
        .with_context(|| format!("compose segment {}", out_mp4.display()))?;

        if !made {
            anyhow::bail!("segment was not written: {}", out_mp4.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn frame_count_rounds_and_never_hits_zero() {
        let frame = FrameSpec::default();
        assert_eq!(frame.frames_for(2.0), 60);
        assert_eq!(frame.frames_for(0.01), 1);
        assert_eq!(frame.frames_for(1.016), 30);
    }

    #[test]
    fn file_sources_loop_until_cut() {
        let composer = SegmentComposer::default();
        let args = composer.input_args(&ClipSource::File {
            path: PathBuf::from("cache/abc.mp4"),
        });
        assert_eq!(args, vec!["-stream_loop", "-1", "-i", "cache/abc.mp4"]);
    }

    #[test]
    fn solid_source_is_a_full_frame_color() {
        let composer = SegmentComposer::default();
        let args = composer.input_args(&ClipSource::Solid { rgb: (10, 10, 14) });
        assert_eq!(args[1], "lavfi");
        assert_eq!(args[3], "color=c=0x0A0A0E:s=1080x1920:r=30");
    }

    #[test]
    fn filter_covers_crops_and_zooms_over_whole_segment() {
        let composer = SegmentComposer::default();
        let f = composer.filter(4.0);
        assert!(f.starts_with("scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920"));
        assert!(f.contains("z='1+0.0200*on/120'"));
        assert!(f.contains("s=1080x1920"));
        assert!(f.ends_with("format=yuv420p"));
    }

    #[test]
    fn zoom_can_be_disabled() {
        let composer = SegmentComposer {
            zoom_end: 1.0,
            ..Default::default()
        };
        assert!(!composer.filter(3.0).contains("zoompan"));
    }
}
