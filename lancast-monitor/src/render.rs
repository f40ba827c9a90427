//! Text rendering of rate samples.

use lancast_core::bandwidth::{RateSample, to_kbps};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One bar per value, scaled to the largest value in the slice.
///
/// An all-zero series renders as the lowest bar.
pub fn sparkline(values: &[f64]) -> String {
    let peak = values.iter().copied().fold(0.0f64, f64::max);
    values
        .iter()
        .map(|&v| {
            if peak <= 0.0 || !v.is_finite() {
                return BARS[0];
            }
            let level = (v.max(0.0) / peak * (BARS.len() - 1) as f64).round() as usize;
            BARS[level.min(BARS.len() - 1)]
        })
        .collect()
}

/// The per-interval status line.
pub fn status_line(sample: &RateSample, total_history: Option<&[f64]>) -> String {
    match total_history {
        Some(history) if !history.is_empty() => {
            let peak = history.iter().copied().fold(0.0f64, f64::max);
            format!(
                "{sample} | peak {:8.2} KB/s {}",
                to_kbps(peak),
                sparkline(history)
            )
        }
        _ => sample.to_string(),
    }
}
