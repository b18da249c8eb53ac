use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};

use crate::metrics::SamplerMetricsSnapshot;
use crate::models::{PhysioSample, TrialIndex, TrialSummary};
use crate::sensing::{SamplerController, SnapshotCell, StudyClock};

use super::state::{TrackingState, TrackingStatus, TrialWindow};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Per-trial sample buckets fed by the fixed-rate sampler.
///
/// Lives on the frame thread. The sampler thread only ever touches the sending
/// half of the queue; buckets are reachable through accessors alone.
pub struct TrialSampleStore {
    sampler: SamplerController,
    cell: SnapshotCell,
    clock: StudyClock,
    tx: Sender<PhysioSample>,
    rx: Receiver<PhysioSample>,
    state: TrackingState,
    buckets: BTreeMap<TrialIndex, Vec<PhysioSample>>,
    windows: BTreeMap<TrialIndex, TrialWindow>,
    discarded: u64,
}

impl TrialSampleStore {
    pub fn new(cell: SnapshotCell, clock: StudyClock, hz: u32) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            sampler: SamplerController::new(hz),
            cell,
            clock,
            tx,
            rx,
            state: TrackingState::new(),
            buckets: BTreeMap::new(),
            windows: BTreeMap::new(),
            discarded: 0,
        }
    }

    pub fn active_trial(&self) -> Option<TrialIndex> {
        self.state.active_trial
    }

    pub fn status(&self) -> TrackingStatus {
        self.state.status
    }

    pub fn is_tracking(&self) -> bool {
        self.sampler.is_running()
    }

    /// Samples thrown away by `drain` because no trial was active.
    pub fn discarded_count(&self) -> u64 {
        self.discarded
    }

    pub fn start_tracking(&mut self, trial: TrialIndex) -> Result<()> {
        self.start_tracking_with(trial, |store| {
            store
                .sampler
                .start_sampling(store.cell.clone(), store.tx.clone(), &store.clock)
        })
    }

    /// Bucket and window for `trial` only exist once `start` has succeeded.
    fn start_tracking_with(
        &mut self,
        trial: TrialIndex,
        start: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if self.sampler.is_running() {
            // Previous trial never stopped; close it out so its tail lands in
            // its own bucket before the index changes.
            self.halt_sampler()?;
        }
        self.flush();
        self.close_window();

        let started_at = Utc::now();
        self.state.begin_trial(trial, started_at);

        if let Err(err) = start(self) {
            log_error!("tracking for trial {} failed to start: {err:?}", trial);
            self.state.cancel();
            return Err(err).with_context(|| format!("tracking not started for trial {trial}"));
        }

        self.buckets.entry(trial).or_default();
        self.windows.insert(
            trial,
            TrialWindow {
                started_at: Some(started_at),
                stopped_at: None,
            },
        );

        log_info!("tracking started for trial {}", trial);
        Ok(())
    }

    /// Stops the sampler, waits for it to exit and files everything it produced
    /// under the active trial. Safe to call when nothing is tracked.
    pub fn stop_tracking(&mut self) -> Result<()> {
        let halted = self.halt_sampler();
        self.flush();
        if let Some(trial) = self.state.active_trial {
            log_info!(
                "tracking stopped for trial {} ({} samples)",
                trial,
                self.buckets.get(&trial).map_or(0, Vec::len)
            );
        }
        self.close_window();
        self.state.cancel();
        halted
    }

    /// Moves every queued sample into the active trial's buffer, or discards
    /// them when no trial is active. Returns how many were buffered.
    pub fn drain(&mut self) -> usize {
        let mut buffered = 0;
        let mut dropped = 0;
        for sample in self.rx.try_iter() {
            if self.state.accept(sample) {
                buffered += 1;
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.discarded += dropped;
            log_debug!("discarded {} samples outside a tracked trial", dropped);
        }
        buffered
    }

    /// Appends the in-progress buffer to the active trial's bucket.
    pub fn flush(&mut self) {
        let Some(trial) = self.state.active_trial else {
            return;
        };
        let pending = self.state.take_buffer();
        if pending.is_empty() {
            return;
        }
        self.buckets.entry(trial).or_default().extend(pending);
    }

    pub fn get_all_tracking_data(&mut self) -> &BTreeMap<TrialIndex, Vec<PhysioSample>> {
        self.flush();
        &self.buckets
    }

    /// Empty when the trial was never tracked.
    pub fn get_tracking_data_for(&mut self, trial: TrialIndex) -> &[PhysioSample] {
        self.flush();
        self.buckets.get(&trial).map_or(&[], Vec::as_slice)
    }

    pub fn trial_summaries(&mut self) -> Vec<TrialSummary> {
        self.flush();
        self.buckets
            .iter()
            .map(|(trial, samples)| {
                let window = self.windows.get(trial).copied().unwrap_or_default();
                TrialSummary::from_samples(*trial, samples, window.started_at, window.stopped_at)
            })
            .collect()
    }

    pub fn sampler_metrics(&self) -> SamplerMetricsSnapshot {
        self.sampler.metrics().get_snapshot()
    }

    /// Drops every bucket and leaves no trial active. A running sampler is
    /// stopped and its output discarded.
    pub fn clear_all(&mut self) -> Result<()> {
        let halted = self.halt_sampler();
        self.state.cancel();
        self.drain();
        self.buckets.clear();
        self.windows.clear();
        self.discarded = 0;
        self.sampler.metrics().reset();
        log_info!("all trial buckets cleared");
        halted
    }

    /// Joins the sampler thread and pulls whatever it enqueued into the buffer.
    fn halt_sampler(&mut self) -> Result<()> {
        let result = self.sampler.stop_sampling();
        if let Err(err) = &result {
            log_warn!("sampler did not stop cleanly: {err:?}");
        }
        self.drain();
        result
    }

    fn close_window(&mut self) {
        if let Some(trial) = self.state.active_trial {
            if let Some(window) = self.windows.get_mut(&trial) {
                window.stopped_at.get_or_insert_with(Utc::now);
            }
        }
    }
}
