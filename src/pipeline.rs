use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use nalgebra::Point3;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::calibration::{CalibrationConfig, CalibrationStatus, DriftCalibrator, DriftCorrection};
use crate::metrics::SamplerMetricsSnapshot;
use crate::models::{CalibrationResult, PhysioSample, TrialIndex, TrialSummary};
use crate::sensing::{AcquisitionFrontend, RayCaster, SensorSource, SnapshotCell, StudyClock};
use crate::settings::PipelineSettings;
use crate::tracking::TrialSampleStore;

/// Everything an exporter needs at the end of a study.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyReport {
    pub eye_tracking_available: bool,
    pub sampler_hz: u32,
    pub correction: Option<CalibrationResult>,
    pub trials: Vec<TrialSummary>,
    pub sampler: SamplerMetricsSnapshot,
}

/// Frame-thread facade over the frontend, the trial store and the calibrator.
///
/// Call [`StudyPipeline::frame`] once per rendered frame; every other method is
/// a collaborator-facing entry point.
pub struct StudyPipeline {
    frontend: AcquisitionFrontend,
    store: TrialSampleStore,
    calibrator: DriftCalibrator,
    correction: DriftCorrection,
    sampler_hz: u32,
}

impl StudyPipeline {
    pub fn new(
        settings: &PipelineSettings,
        sensor: Box<dyn SensorSource>,
        raycaster: Arc<dyn RayCaster>,
    ) -> Self {
        let clock = StudyClock::new();
        let cell = SnapshotCell::new();
        let correction = DriftCorrection::new();
        let sampler_hz = settings.sampler.effective_hz();

        let frontend = AcquisitionFrontend::new(
            sensor,
            raycaster,
            correction.reader(),
            cell.clone(),
            clock,
            settings.frontend.clone(),
        );
        let store = TrialSampleStore::new(cell, clock, sampler_hz);
        let calibrator = DriftCalibrator::new(
            CalibrationConfig::from(&settings.calibration),
            correction.clone(),
        );

        Self {
            frontend,
            store,
            calibrator,
            correction,
            sampler_hz,
        }
    }

    pub fn frontend(&self) -> &AcquisitionFrontend {
        &self.frontend
    }

    /// One frame: publish a snapshot, drain the sampler queue, step calibration.
    /// Returns a calibration result on the frame a run resolves.
    pub fn frame(&mut self, now: Instant) -> Option<CalibrationResult> {
        self.frontend.update();
        self.store.drain();
        if self.calibrator.is_running() {
            self.calibrator.advance(now, self.frontend.raw_binocular_gaze())
        } else {
            None
        }
    }

    pub fn start_tracking_for_trial(&mut self, trial: TrialIndex) -> Result<()> {
        self.store.start_tracking(trial)
    }

    pub fn stop_tracking(&mut self) -> Result<()> {
        self.store.stop_tracking()
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.store.clear_all()
    }

    pub fn active_trial(&self) -> Option<TrialIndex> {
        self.store.active_trial()
    }

    pub fn get_all_tracking_data(&mut self) -> &BTreeMap<TrialIndex, Vec<PhysioSample>> {
        self.store.get_all_tracking_data()
    }

    pub fn get_tracking_data_for(&mut self, trial: TrialIndex) -> &[PhysioSample] {
        self.store.get_tracking_data_for(trial)
    }

    pub fn trial_summaries(&mut self) -> Vec<TrialSummary> {
        self.store.trial_summaries()
    }

    pub fn sampler_metrics(&self) -> SamplerMetricsSnapshot {
        self.store.sampler_metrics()
    }

    pub fn set_fixation_target(&mut self, target: Option<Point3<f32>>) {
        self.calibrator.set_fixation_target(target);
    }

    /// Arms a calibration run that subsequent `frame` calls advance.
    pub fn begin_calibration(&mut self, calibrate_timeout: Duration, verify_timeout: Duration) -> Uuid {
        self.calibrator
            .begin_with_timeouts(Instant::now(), calibrate_timeout, verify_timeout)
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.calibrator.status()
    }

    /// Runs a calibration to completion, driving frames at `frame_period`.
    pub async fn run_calibration(
        &mut self,
        calibrate_timeout: Duration,
        verify_timeout: Duration,
        frame_period: Duration,
    ) -> CalibrationResult {
        let run_id = self.begin_calibration(calibrate_timeout, verify_timeout);
        let mut ticker = tokio::time::interval(frame_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(result) = self.frame(Instant::now()) {
                return result;
            }
            // Resolved outside `frame`, e.g. re-armed by a collaborator.
            if !self.calibrator.is_running() {
                if let Some(result) = self.calibrator.last_result() {
                    return result.clone();
                }
                return CalibrationResult::unavailable(run_id, 0);
            }
        }
    }

    /// Drives frames for `duration` without touching trial state.
    pub async fn run_frames(&mut self, duration: Duration, frame_period: Duration) {
        let mut ticker = tokio::time::interval(frame_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // A duration past the clock's range just means "until dropped".
        let deadline = Instant::now().checked_add(duration);

        while deadline.map_or(true, |deadline| Instant::now() < deadline) {
            ticker.tick().await;
            self.frame(Instant::now());
        }
    }

    pub fn get_current_correction(&self) -> Option<CalibrationResult> {
        self.correction.current()
    }

    pub fn clear_correction(&self) {
        self.correction.clear();
    }

    pub fn report(&mut self) -> StudyReport {
        StudyReport {
            eye_tracking_available: self.frontend.eye_tracking_available(),
            sampler_hz: self.sampler_hz,
            correction: self.get_current_correction(),
            trials: self.trial_summaries(),
            sampler: self.sampler_metrics(),
        }
    }
}
