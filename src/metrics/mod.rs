mod types;

pub use types::{SamplerMetricsSnapshot, TickMetrics};

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

const MAX_RECENT_TICKS: usize = 20;

/// Counters for the fixed-rate sampler, shared between the sampler thread and
/// whoever wants a snapshot.
pub struct SamplerMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_ticks: VecDeque<TickMetrics>,
    tick_count: u64,
    enqueued_count: u64,
    skipped_count: u64,
    late_count: u64,
    max_lateness_us: u64,
}

impl SamplerMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_ticks: VecDeque::with_capacity(MAX_RECENT_TICKS),
                ..MetricsState::default()
            })),
        }
    }

    /// `late` is set by the loop when the tick fell a whole period behind.
    pub fn record_tick(&self, tick: TickMetrics, late: bool) {
        let mut state = self.lock();

        state.tick_count += 1;
        if tick.enqueued {
            state.enqueued_count += 1;
        } else {
            state.skipped_count += 1;
        }
        if late {
            state.late_count += 1;
        }
        state.max_lateness_us = state.max_lateness_us.max(tick.lateness_us);

        state.recent_ticks.push_back(tick);
        if state.recent_ticks.len() > MAX_RECENT_TICKS {
            state.recent_ticks.pop_front();
        }
    }

    pub fn get_snapshot(&self) -> SamplerMetricsSnapshot {
        let state = self.lock();
        SamplerMetricsSnapshot {
            tick_count: state.tick_count,
            enqueued_count: state.enqueued_count,
            skipped_count: state.skipped_count,
            late_count: state.late_count,
            max_lateness_us: state.max_lateness_us,
            recent_ticks: state.recent_ticks.iter().copied().collect(),
        }
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        *state = MetricsState {
            recent_ticks: VecDeque::with_capacity(MAX_RECENT_TICKS),
            ..MetricsState::default()
        };
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SamplerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SamplerMetrics {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(enqueued: bool, lateness_us: u64) -> TickMetrics {
        TickMetrics {
            timestamp: enqueued.then_some(1.0),
            lateness_us,
            enqueued,
        }
    }

    #[test]
    fn test_counts_and_ring_bound() {
        let metrics = SamplerMetrics::new();
        for i in 0..30 {
            metrics.record_tick(tick(i % 3 != 0, i), i == 29);
        }

        let snapshot = metrics.get_snapshot();
        assert_eq!(snapshot.tick_count, 30);
        assert_eq!(snapshot.skipped_count, 10);
        assert_eq!(snapshot.enqueued_count, 20);
        assert_eq!(snapshot.late_count, 1);
        assert_eq!(snapshot.max_lateness_us, 29);
        assert_eq!(snapshot.recent_ticks.len(), MAX_RECENT_TICKS);
        assert_eq!(snapshot.recent_ticks.last().map(|t| t.lateness_us), Some(29));
    }

    #[test]
    fn test_reset_is_shared_across_clones() {
        let metrics = SamplerMetrics::new();
        let handle = metrics.clone();
        handle.record_tick(tick(true, 5), false);
        assert_eq!(metrics.get_snapshot().tick_count, 1);

        metrics.reset();
        assert_eq!(handle.get_snapshot(), SamplerMetricsSnapshot::default());
        assert_eq!(handle.get_snapshot().skip_ratio(), 0.0);
    }
}
