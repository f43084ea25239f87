//! Percentile math shared by the sliding-window and metric-flush paths.

/// Nearest-rank percentile over pre-sorted values.
///
/// The index is `ceil(p/100 * n) - 1`, clamped to `[0, n-1]`. Returns
/// `None` when `sorted` is empty.
pub fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = ((percentile / 100.0) * n as f64).ceil() as isize - 1;
    let idx = rank.clamp(0, n as isize - 1) as usize;
    Some(sorted[idx])
}
