use serde::{Deserialize, Serialize};

/// One sampler tick as observed by the loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TickMetrics {
    /// Study-clock timestamp stamped on the tick's sample, if one was taken.
    pub timestamp: Option<f64>,
    /// How far past its scheduled instant the tick actually ran.
    pub lateness_us: u64,
    pub enqueued: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamplerMetricsSnapshot {
    pub tick_count: u64,
    pub enqueued_count: u64,
    /// Ticks that found no snapshot to copy.
    pub skipped_count: u64,
    /// Ticks that ran more than one period behind schedule.
    pub late_count: u64,
    pub max_lateness_us: u64,
    pub recent_ticks: Vec<TickMetrics>,
}

impl SamplerMetricsSnapshot {
    pub fn skip_ratio(&self) -> f64 {
        if self.tick_count == 0 {
            0.0
        } else {
            self.skipped_count as f64 / self.tick_count as f64
        }
    }
}
