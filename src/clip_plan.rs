use crate::allocate::allocate;
use crate::fetcher::LocalClip;
use serde::Serialize;
use std::path::PathBuf;

/// Near-black background used when no footage could be obtained.
pub const FALLBACK_RGB: (u8, u8, u8) = (10, 10, 14);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipSource {
    File { path: PathBuf },
    Solid { rgb: (u8, u8, u8) },
}

impl ClipSource {
    /// Real clips when there are any, otherwise exactly one synthetic background.
    pub fn from_clips(clips: &[LocalClip]) -> Vec<ClipSource> {
        if clips.is_empty() {
            return vec![ClipSource::Solid { rgb: FALLBACK_RGB }];
        }
        clips
            .iter()
            .map(|c| ClipSource::File {
                path: c.path.clone(),
            })
            .collect()
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, ClipSource::Solid { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub source: ClipSource,
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

impl Segment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Lays the narration out over the available sources.
///
/// Segment `i` uses source `min(i, len - 1)`, so the last source repeats when
/// there are more segments than sources. When paragraphs outnumber segments,
/// the trailing paragraphs are appended to the last segment's text.
pub fn plan_segments(total_duration: f64, paragraphs: &[String], sources: &[ClipSource]) -> Vec<Segment> {
    let sources: Vec<ClipSource> = if sources.is_empty() {
        vec![ClipSource::Solid { rgb: FALLBACK_RGB }]
    } else {
        sources.to_vec()
    };

    let durations = allocate(total_duration, paragraphs, sources.len());
    let count = durations.len();

    let mut segments = Vec::with_capacity(count);
    let mut start = 0.0;
    for (i, duration) in durations.into_iter().enumerate() {
        let text = if i + 1 == count && paragraphs.len() > count {
            paragraphs[i..].join("\n\n")
        } else {
            paragraphs.get(i).cloned().unwrap_or_default()
        };
        segments.push(Segment {
            source: sources[i.min(sources.len() - 1)].clone(),
            start,
            duration,
            text,
        });
        start += duration;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> ClipSource {
        ClipSource::File {
            path: PathBuf::from(name),
        }
    }

    fn paras(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_clips_means_single_synthetic_source() {
        let sources = ClipSource::from_clips(&[]);
        assert_eq!(sources.len(), 1);
        assert!(sources[0].is_synthetic());
    }

    #[test]
    fn real_clips_never_include_fallback() {
        let clips = vec![LocalClip {
            url: "https://example.com/a.mp4".into(),
            path: PathBuf::from("cache/a.mp4"),
            width: 1080,
            height: 1920,
        }];
        let sources = ClipSource::from_clips(&clips);
        assert_eq!(sources, vec![file("cache/a.mp4")]);
    }

    #[test]
    fn starts_are_cumulative() {
        let segs = plan_segments(
            30.0,
            &paras(&["0123456789", "01234567890123456789"]),
            &[file("a"), file("b")],
        );
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].start, 0.0);
        assert!((segs[1].start - 10.0).abs() < 1e-9);
        assert!((segs[1].end() - 30.0).abs() < 1e-9);
        assert_eq!(segs[1].source, file("b"));
    }

    #[test]
    fn extra_paragraphs_fold_into_last_segment_text() {
        let segs = plan_segments(9.0, &paras(&["one", "two", "three"]), &[file("a"), file("b")]);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, "one");
        assert_eq!(segs[1].text, "two\n\nthree");
    }

    #[test]
    fn synthetic_plan_covers_whole_narration() {
        let segs = plan_segments(12.5, &paras(&["a", "b", "c"]), &ClipSource::from_clips(&[]));
        assert_eq!(segs.len(), 1);
        assert!(segs[0].source.is_synthetic());
        assert!((segs[0].duration - 12.5).abs() < 1e-9);
        assert_eq!(segs[0].text, "a\n\nb\n\nc");
    }
}
