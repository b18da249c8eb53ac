use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PhysioSample, TrialIndex};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    #[default]
    Idle,
    Tracking,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "idle",
            TrackingStatus::Tracking => "tracking",
        }
    }
}

/// Wall-clock bounds of the most recent tracking window for a trial.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialWindow {
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// The trial currently receiving samples and its not-yet-flushed buffer.
#[derive(Debug, Default)]
pub struct TrackingState {
    pub status: TrackingStatus,
    pub active_trial: Option<TrialIndex>,
    pub started_at: Option<DateTime<Utc>>,
    /// Samples drained since the last flush, in arrival order.
    pub buffer: Vec<PhysioSample>,
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_trial(&mut self, trial: TrialIndex, started_at: DateTime<Utc>) {
        *self = Self {
            status: TrackingStatus::Tracking,
            active_trial: Some(trial),
            started_at: Some(started_at),
            buffer: Vec::new(),
        };
    }

    /// Buffers samples for the active trial. Returns false when nothing is
    /// being tracked, in which case the caller must discard them.
    pub fn accept(&mut self, sample: PhysioSample) -> bool {
        if self.active_trial.is_none() {
            return false;
        }
        self.buffer.push(sample);
        true
    }

    pub fn take_buffer(&mut self) -> Vec<PhysioSample> {
        std::mem::take(&mut self.buffer)
    }

    pub fn cancel(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forward;
    use nalgebra::Point3;

    #[test]
    fn test_accept_only_while_tracking() {
        let mut state = TrackingState::new();
        let sample = PhysioSample::head(0.0, Point3::origin(), forward(), true);
        assert!(!state.accept(sample.clone()));
        assert!(state.buffer.is_empty());

        state.begin_trial(2, Utc::now());
        assert_eq!(state.status, TrackingStatus::Tracking);
        assert!(state.accept(sample));
        assert_eq!(state.take_buffer().len(), 1);
        assert!(state.buffer.is_empty());

        state.cancel();
        assert_eq!(state.status.as_str(), "idle");
        assert!(state.active_trial.is_none());
    }
}
