//! Interval and instantaneous-frequency statistics.
//!
//! A [`StatisticsRecord`] is computed fresh from an [`EventLog`] snapshot and
//! never mutated in place. The standard deviation uses the population
//! estimator (divide by n): with the short series this tool produces it is
//! reproducible and avoids the n = 1 singularity of the sample estimator.
//! Percentiles are nearest-rank without interpolation.

use crate::log::EventLog;

/// Δt below this is treated as a degenerate sample in frequency mode.
const MIN_INTERVAL_MS: f64 = 1e-5;

/// Which derived value the statistics run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalMode {
    /// Raw Δt between consecutive timestamps, in milliseconds.
    Interval,
    /// Instantaneous report rate 1000/Δt in Hz; degenerate Δt counts as 0.
    Frequency,
}

/// Aggregate over the n-1 interval (or frequency) values of a log.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatisticsRecord {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub range: f64,
    pub median: f64,
    /// 1% low tail.
    pub p1_low: f64,
    /// 0.1% low tail.
    pub p01_low: f64,
    /// 99% high tail.
    pub p99_high: f64,
    /// 99.9% high tail.
    pub p999_high: f64,
}

/// Compute statistics over the consecutive-timestamp deltas of `log`.
///
/// Requires at least 2 events; otherwise returns a zeroed record.
pub fn interval_statistics(log: &EventLog, mode: IntervalMode) -> StatisticsRecord {
    let events = log.events();
    if events.len() < 2 {
        return StatisticsRecord::default();
    }

    let mut values: Vec<f64> = events
        .windows(2)
        .map(|w| {
            let dt = w[1].time_ms - w[0].time_ms;
            match mode {
                IntervalMode::Interval => dt,
                IntervalMode::Frequency => {
                    if dt <= MIN_INTERVAL_MS {
                        0.0
                    } else {
                        1000.0 / dt
                    }
                }
            }
        })
        .collect();

    let n = values.len();
    let mut sum = 0.0;
    let mut min = values[0];
    let mut max = values[0];
    for &v in &values {
        sum += v;
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    let mean = sum / n as f64;

    let sq_diff_sum: f64 = values.iter().map(|&v| (v - mean) * (v - mean)).sum();
    let stdev = (sq_diff_sum / n as f64).sqrt();

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };

    StatisticsRecord {
        min,
        max,
        mean,
        stdev,
        range: max - min,
        median,
        p1_low: nearest_rank(&values, 0.01),
        p01_low: nearest_rank(&values, 0.001),
        p99_high: nearest_rank(&values, 0.99),
        p999_high: nearest_rank(&values, 0.999),
    }
}

/// Nearest-rank percentile: index the sorted sample at `fraction * n`,
/// clamped to the last valid index.
pub fn nearest_rank(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((fraction * sorted.len() as f64) as usize).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MouseEvent;

    fn log_with_times(times: &[f64]) -> EventLog {
        let mut log = EventLog::new();
        for &t in times {
            log.push(MouseEvent { button_flags: 0, dx: 1, dy: 0, counter: 0, time_ms: t });
        }
        log
    }

    #[test]
    fn interval_basics() {
        // Timestamps producing intervals [1, 2, 3, 4] ms.
        let log = log_with_times(&[0.0, 1.0, 3.0, 6.0, 10.0]);
        let s = interval_statistics(&log, IntervalMode::Interval);

        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.median - 2.5).abs() < 1e-12);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.range, 3.0);
        // Population estimator over [1,2,3,4]: sqrt(1.25).
        assert!((s.stdev - 1.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn fewer_than_two_events_is_zeroed() {
        let log = log_with_times(&[0.0]);
        assert_eq!(interval_statistics(&log, IntervalMode::Interval), StatisticsRecord::default());
        assert_eq!(
            interval_statistics(&EventLog::new(), IntervalMode::Frequency),
            StatisticsRecord::default()
        );
    }

    #[test]
    fn frequency_mode_guards_degenerate_dt() {
        let log = log_with_times(&[0.0, 0.0, 2.0]);
        let s = interval_statistics(&log, IntervalMode::Frequency);
        // First delta is 0 ms -> sample is 0, second is 2 ms -> 500 Hz.
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 500.0);
    }

    #[test]
    fn median_odd_count() {
        let log = log_with_times(&[0.0, 5.0, 6.0, 10.0]);
        let s = interval_statistics(&log, IntervalMode::Interval);
        // intervals [5, 1, 4], sorted [1, 4, 5]
        assert_eq!(s.median, 4.0);
    }

    #[test]
    fn percentile_is_monotonic_in_fraction() {
        let sorted = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0];
        let fractions = [0.0, 0.001, 0.01, 0.25, 0.5, 0.75, 0.99, 0.999, 1.0];
        for w in fractions.windows(2) {
            assert!(nearest_rank(&sorted, w[1]) >= nearest_rank(&sorted, w[0]));
        }
    }

    #[test]
    fn percentile_clamps_to_last_index() {
        let sorted = [3.0, 7.0];
        assert_eq!(nearest_rank(&sorted, 0.999), 7.0);
        assert_eq!(nearest_rank(&sorted, 1.0), 7.0);
        assert_eq!(nearest_rank(&[], 0.5), 0.0);
    }

    #[test]
    fn tails_on_larger_sample() {
        let times: Vec<f64> = (0..=1000).map(|i| i as f64).collect();
        let log = log_with_times(&times);
        let s = interval_statistics(&log, IntervalMode::Interval);
        // All intervals are 1 ms.
        assert_eq!(s.p01_low, 1.0);
        assert_eq!(s.p1_low, 1.0);
        assert_eq!(s.p99_high, 1.0);
        assert_eq!(s.p999_high, 1.0);
        assert_eq!(s.stdev, 0.0);
    }
}
