//! Descriptive statistics shared by the aggregation pipeline

use ndarray::{Array2, Axis};
use serde::Serialize;

/// `part / whole` as a percentage; an empty denominator yields 0
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Count-based rate in percent
pub fn rate(count: usize, total: usize) -> f64 {
    percentage(count as f64, total as f64)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linearly interpolated quantile of already sorted values (`q` in 0..=1)
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

pub fn quantile(values: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(values), q)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Five-number summary with 1.5 IQR whiskers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest value within `q1 - 1.5 * IQR`
    pub whisker_low: f64,
    /// Largest value within `q3 + 1.5 * IQR`
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted(values);
        let q1 = quantile_sorted(&sorted, 0.25);
        let median = quantile_sorted(&sorted, 0.5);
        let q3 = quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        let (low_fence, high_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let inside = sorted.iter().filter(|v| (low_fence..=high_fence).contains(*v));
        let whisker_low = inside.clone().next().copied().unwrap_or(q1);
        let whisker_high = inside.last().copied().unwrap_or(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| !(low_fence..=high_fence).contains(v))
            .collect();

        BoxStats {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width histogram over `[lo, hi]`; the last bin is closed on the right
pub fn histogram_in_range(values: &[f64], bins: usize, lo: f64, hi: f64) -> Vec<HistogramBin> {
    if bins == 0 || hi <= lo {
        return Vec::new();
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values.iter().filter(|v| (lo..=hi).contains(*v)) {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + i as f64 * width,
            end: lo + (i + 1) as f64 * width,
            count,
        })
        .collect()
}

/// Equal-width histogram spanning the data range
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        return histogram_in_range(values, bins, lo - 0.5, hi + 0.5);
    }
    histogram_in_range(values, bins, lo, hi)
}

/// Pearson correlation between the columns of `data` (rows = observations).
///
/// A column without variance correlates 0 with every other column and 1 with itself.
pub fn correlation(data: &Array2<f64>) -> Array2<f64> {
    let n_cols = data.ncols();
    let Some(means) = data.mean_axis(Axis(0)) else {
        return Array2::eye(n_cols);
    };
    let centered = data - &means;
    let cov = centered.t().dot(&centered);

    Array2::from_shape_fn((n_cols, n_cols), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (cov[[i, i]] * cov[[j, j]]).sqrt();
        if denom == 0.0 {
            0.0
        } else {
            cov[[i, j]] / denom
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_percentage_handles_empty_denominator() {
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(rate(0, 0), 0.0);
        assert!((rate(1, 3) - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_median_and_quantiles() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.25), 2.0);
        assert_eq!(max(&[1.0, 7.5, 3.0]), 7.5);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_box_stats_flags_outliers() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let stats = BoxStats::from_values(&values);
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.outliers, vec![100.0]);
        assert_eq!(stats.whisker_low, 1.0);
        assert_eq!(stats.whisker_high, 5.0);
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let values = [0.0, 1.0, 2.5, 9.9, 10.0];
        let bins = histogram(&values, 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), values.len());
        assert_eq!(bins[3].count, 2);

        let rates = histogram_in_range(&[50.0, 100.0, 100.0], 10, 0.0, 100.0);
        assert_eq!(rates[5].count, 1);
        assert_eq!(rates[9].count, 2);
    }

    #[test]
    fn test_correlation() {
        let data = array![[1.0, 2.0, 5.0], [2.0, 4.0, 5.0], [3.0, 6.0, 5.0]];
        let corr = correlation(&data);
        assert!((corr[[0, 1]] - 1.0).abs() < 1e-12);
        assert_eq!(corr[[0, 2]], 0.0);
        assert_eq!(corr[[2, 2]], 1.0);
    }
}
