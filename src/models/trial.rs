use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::PhysioSample;

/// Index of the presented stimulus a bucket belongs to.
pub type TrialIndex = u32;

/// Per-bucket digest handed to exporters alongside the raw samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialSummary {
    pub trial: TrialIndex,
    pub sample_count: usize,
    pub valid_count: usize,
    pub gaze_valid_count: usize,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TrialSummary {
    pub fn from_samples(
        trial: TrialIndex,
        samples: &[PhysioSample],
        started_at: Option<DateTime<Utc>>,
        stopped_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            trial,
            sample_count: samples.len(),
            valid_count: samples.iter().filter(|s| s.is_valid).count(),
            gaze_valid_count: samples.iter().filter(|s| s.gaze_valid()).count(),
            first_timestamp: samples.first().map(|s| s.timestamp),
            last_timestamp: samples.last().map(|s| s.timestamp),
            started_at,
            stopped_at,
        }
    }

    /// Samples per second across the bucket's span.
    pub fn effective_rate_hz(&self) -> Option<f64> {
        let (first, last) = (self.first_timestamp?, self.last_timestamp?);
        let span = last - first;
        if span <= 0.0 || self.sample_count < 2 {
            return None;
        }
        Some((self.sample_count - 1) as f64 / span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::forward;
    use nalgebra::Point3;

    fn sample_at(ts: f64, valid: bool) -> PhysioSample {
        PhysioSample::head(ts, Point3::origin(), forward(), valid)
    }

    #[test]
    fn test_summary_counts_and_rate() {
        let samples: Vec<_> = (0..10)
            .map(|i| sample_at(i as f64 * 0.1, i % 2 == 0))
            .collect();
        let summary = TrialSummary::from_samples(3, &samples, None, None);
        assert_eq!(summary.sample_count, 10);
        assert_eq!(summary.valid_count, 5);
        assert_eq!(summary.gaze_valid_count, 0);
        let rate = summary.effective_rate_hz().unwrap();
        assert!((rate - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_summary_has_no_rate() {
        let summary = TrialSummary::from_samples(0, &[], None, None);
        assert_eq!(summary.sample_count, 0);
        assert!(summary.effective_rate_hz().is_none());
    }
}
