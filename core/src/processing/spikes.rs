use crate::math::StatsHelper;

pub const DEFAULT_SPIKE_THRESHOLD: f64 = 5.0;
/// Scales the MAD to a standard-deviation estimate for Gaussian noise.
const MAD_SCALE: f64 = 1.4826;
const LOCAL_MEDIAN_WINDOW: usize = 5;

/// Replaces outliers by the median of the non-outlier samples in their
/// 5-sample neighbourhood.
///
/// A sample is an outlier when `|x - median| / (1.4826 · MAD)` exceeds
/// `threshold`. The window is truncated at the ends of the trace. When every
/// neighbour is an outlier too (a burst of adjacent spikes) the global median
/// is used, so a replacement is never itself an outlier. Returns the cleaned
/// copy and the number of replaced samples; a trace with zero MAD is returned
/// unchanged.
pub fn remove_spikes(samples: &[f64], threshold: f64) -> (Vec<f64>, usize) {
    let mut cleaned = samples.to_vec();
    if samples.is_empty() {
        return (cleaned, 0);
    }
    let median = StatsHelper::median(samples);
    let mad = StatsHelper::mad(samples, median);
    if mad.is_nan() || mad <= 0.0 {
        return (cleaned, 0);
    }

    let scale = MAD_SCALE * mad;
    let is_outlier = |value: f64| (value - median).abs() / scale > threshold;
    let half = LOCAL_MEDIAN_WINDOW / 2;
    let mut count = 0;
    for (i, value) in samples.iter().enumerate() {
        if !is_outlier(*value) {
            continue;
        }
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(samples.len());
        let neighbours: Vec<f64> = samples[lo..hi]
            .iter()
            .copied()
            .filter(|v| !is_outlier(*v))
            .collect();
        cleaned[i] = if neighbours.is_empty() {
            median
        } else {
            StatsHelper::median(&neighbours)
        };
        count += 1;
    }
    (cleaned, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_sine() -> Vec<f64> {
        (0..400)
            .map(|i| (i as f64 * 0.2).sin() + 0.05 * ((i * 7919) % 13) as f64 / 13.0)
            .collect()
    }

    #[test]
    fn isolated_spikes_are_replaced() {
        let mut data = noisy_sine();
        data[50] = 40.0;
        data[200] = -55.0;
        let (cleaned, count) = remove_spikes(&data, DEFAULT_SPIKE_THRESHOLD);
        assert_eq!(count, 2);
        assert!(cleaned[50].abs() < 1.5);
        assert!(cleaned[200].abs() < 1.5);
        assert_eq!(cleaned[51], data[51]);
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let mut data = noisy_sine();
        data[10] = 30.0;
        data[399] = 25.0;
        let (once, _) = remove_spikes(&data, DEFAULT_SPIKE_THRESHOLD);
        let (twice, count) = remove_spikes(&once, DEFAULT_SPIKE_THRESHOLD);
        assert_eq!(count, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn adjacent_spikes_are_cleaned_in_one_pass() {
        let mut data = noisy_sine();
        data[100..103].copy_from_slice(&[50.0, 50.0, 50.0]);
        data[250..255].copy_from_slice(&[-40.0; 5]);
        let (once, count) = remove_spikes(&data, DEFAULT_SPIKE_THRESHOLD);
        assert_eq!(count, 8);
        assert!(once[100..103].iter().all(|v| v.abs() < 1.5));
        assert!(once[250..255].iter().all(|v| v.abs() < 1.5));
        let (_, again) = remove_spikes(&once, DEFAULT_SPIKE_THRESHOLD);
        assert_eq!(again, 0);
    }

    #[test]
    fn constant_trace_is_a_no_op() {
        let data = vec![2.0; 32];
        let (cleaned, count) = remove_spikes(&data, DEFAULT_SPIKE_THRESHOLD);
        assert_eq!(count, 0);
        assert_eq!(cleaned, data);
    }

    #[test]
    fn empty_trace_is_a_no_op() {
        assert_eq!(remove_spikes(&[], 5.0), (Vec::new(), 0));
    }
}
