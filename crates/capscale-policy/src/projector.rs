//! Telemetry projection.
//!
//! The metrics source returns one sum per bucket. Decisions use the worst
//! per-second rate in the window rather than the mean, so a short burst is
//! not averaged away.

use capscale_core::{Sample, SampleWindow};

/// Highest per-second rate across `samples`, each a sum over a bucket of
/// `bucket_seconds`. Returns 0 for an empty window.
pub fn project(samples: &[Sample], bucket_seconds: f64) -> f64 {
    if samples.is_empty() || bucket_seconds <= 0.0 {
        return 0.0;
    }

    samples
        .iter()
        .map(|s| s.sum / bucket_seconds)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// [`project`] using the bucket width of a configured window.
pub fn project_window(samples: &[Sample], window: &SampleWindow) -> f64 {
    project(samples, window.bucket_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};

    fn samples(sums: &[f64]) -> Vec<Sample> {
        let start = Utc::now();
        sums.iter()
            .enumerate()
            .map(|(i, &sum)| Sample {
                timestamp: start + TimeDelta::minutes(i as i64),
                sum,
            })
            .collect()
    }

    #[test]
    fn empty_window_projects_zero() {
        assert_eq!(project(&[], 60.0), 0.0);
    }

    #[test]
    fn picks_peak_bucket_not_average() {
        let s = samples(&[60.0, 600.0, 120.0, 0.0, 30.0]);
        assert_eq!(project(&s, 60.0), 10.0);
    }

    #[test]
    fn single_bucket() {
        let s = samples(&[90.0]);
        assert_eq!(project(&s, 60.0), 1.5);
    }

    #[test]
    fn uses_window_bucket_width() {
        let window = SampleWindow {
            buckets: 2,
            bucket_minutes: 5,
        };
        let s = samples(&[600.0, 1500.0]);
        assert_eq!(project_window(&s, &window), 5.0);
    }
}
