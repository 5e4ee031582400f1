/// Shortest segment the timeline will hold, in seconds.
pub const MIN_SEGMENT_SECONDS: f64 = 0.1;

/// Number of segments for a given clip and paragraph count. Always >= 1.
pub fn segment_count(clip_count: usize, paragraph_count: usize) -> usize {
    clip_count.max(1).min(paragraph_count.max(1))
}

/// Splits `total_duration` over the leading paragraphs, proportional to their
/// character length. Durations under [`MIN_SEGMENT_SECONDS`] are raised to it;
/// the resulting drift from the total is left as is.
pub fn allocate<S: AsRef<str>>(total_duration: f64, paragraphs: &[S], clip_count: usize) -> Vec<f64> {
    let count = segment_count(clip_count, paragraphs.len());
    let weights: Vec<f64> = (0..count)
        .map(|i| {
            paragraphs
                .get(i)
                .map(|p| p.as_ref().chars().count() as f64)
                .unwrap_or(0.0)
        })
        .collect();

    let sum: f64 = weights.iter().sum();
    let total = total_duration.max(0.0);

    weights
        .iter()
        .map(|w| {
            let share = if sum > 0.0 { w / sum } else { 1.0 / count as f64 };
            (total * share).max(MIN_SEGMENT_SECONDS)
        })
        .collect()
}
