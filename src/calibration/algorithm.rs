use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};
use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{CalibrationLabel, CalibrationResult, GazeRay};

use super::config::CalibrationConfig;
use super::correction::DriftCorrection;
use super::geometry::{angle_deg, average_direction, from_to_rotation};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationStatus {
    Idle,
    Calibrating,
    Verifying,
    Resolved(CalibrationLabel),
}

struct CalibrationBatch {
    run_id: Uuid,
    deadline: Instant,
    capacity: usize,
    verify_timeout: Duration,
    directions: Vec<Unit<Vector3<f32>>>,
    last_origin: Point3<f32>,
}

impl CalibrationBatch {
    fn offer(&mut self, now: Instant, gaze: Option<GazeRay>) {
        if self.directions.len() >= self.capacity || now >= self.deadline {
            return;
        }
        if let Some(ray) = gaze {
            self.directions.push(ray.direction);
            self.last_origin = ray.origin;
        }
    }

    fn is_done(&self, now: Instant) -> bool {
        self.directions.len() >= self.capacity || now >= self.deadline
    }
}

struct VerificationBatch {
    run_id: Uuid,
    deadline: Instant,
    capacity: usize,
    offset: UnitQuaternion<f32>,
    raw_error_deg: f32,
    calibration_samples: usize,
    error_sum_deg: f32,
    count: usize,
}

impl VerificationBatch {
    /// The desired direction is recomputed per sample because the origin (and
    /// the target) may have moved since calibration.
    fn offer(&mut self, now: Instant, gaze: Option<GazeRay>, target: Option<Point3<f32>>) {
        if self.count >= self.capacity || now >= self.deadline {
            return;
        }
        let (Some(ray), Some(target)) = (gaze, target) else {
            return;
        };
        let Some(desired) = Unit::try_new(target - ray.origin, 1e-6) else {
            return;
        };
        let corrected = self.offset * ray.direction.into_inner();
        self.error_sum_deg += angle_deg(&corrected, &desired);
        self.count += 1;
    }

    fn is_done(&self, now: Instant) -> bool {
        self.count >= self.capacity || now >= self.deadline
    }

    fn residual_deg(&self) -> f32 {
        if self.count == 0 {
            f32::NAN
        } else {
            self.error_sum_deg / self.count as f32
        }
    }
}

/// Cap applied when a timeout would overflow the monotonic clock.
const MAX_PHASE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_PHASE_WINDOW))
        .unwrap_or(now)
}

enum Phase {
    Idle,
    Calibrating(CalibrationBatch),
    Verifying(VerificationBatch),
    Resolved(CalibrationResult),
}

/// Two-phase drift calibration advanced once per frame.
///
/// `begin` arms a run; each `advance` offers the frame's uncorrected binocular
/// gaze ray and checks the phase deadline. Nothing blocks: a run spans as many
/// frames as its timeouts allow.
pub struct DriftCalibrator {
    config: CalibrationConfig,
    correction: DriftCorrection,
    fixation_target: Option<Point3<f32>>,
    phase: Phase,
}

impl DriftCalibrator {
    pub fn new(config: CalibrationConfig, correction: DriftCorrection) -> Self {
        Self {
            config,
            correction,
            fixation_target: None,
            phase: Phase::Idle,
        }
    }

    pub fn correction(&self) -> &DriftCorrection {
        &self.correction
    }

    /// World-space point the participant fixates during a run.
    pub fn set_fixation_target(&mut self, target: Option<Point3<f32>>) {
        self.fixation_target = target;
    }

    /// Starts a run with the configured timeouts.
    pub fn begin(&mut self, now: Instant) -> Uuid {
        let (calibrate, verify) = (self.config.calibrate_timeout, self.config.verify_timeout);
        self.begin_with_timeouts(now, calibrate, verify)
    }

    /// Starts a run, replacing any run still in progress.
    pub fn begin_with_timeouts(
        &mut self,
        now: Instant,
        calibrate_timeout: Duration,
        verify_timeout: Duration,
    ) -> Uuid {
        if self.is_running() {
            warn!("Drift calibration restarted; discarding the run in progress");
        }

        let run_id = Uuid::new_v4();
        self.phase = Phase::Calibrating(CalibrationBatch {
            run_id,
            deadline: deadline_after(now, calibrate_timeout),
            capacity: self.config.samples_to_average,
            verify_timeout,
            directions: Vec::with_capacity(self.config.samples_to_average),
            last_origin: Point3::origin(),
        });
        info!("Drift calibration {run_id} started");
        run_id
    }

    pub fn cancel(&mut self) {
        if self.is_running() {
            info!("Drift calibration cancelled");
            self.phase = Phase::Idle;
        }
    }

    /// Feeds one frame. Returns the result on the frame the run resolves.
    pub fn advance(&mut self, now: Instant, gaze: Option<GazeRay>) -> Option<CalibrationResult> {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let (next, resolved) = match phase {
            Phase::Calibrating(mut batch) => {
                batch.offer(now, gaze);
                if batch.is_done(now) {
                    self.finish_calibration(batch, now)
                } else {
                    (Phase::Calibrating(batch), None)
                }
            }
            Phase::Verifying(mut batch) => {
                batch.offer(now, gaze, self.fixation_target);
                if batch.is_done(now) {
                    let result = self.resolve(batch);
                    (Phase::Resolved(result.clone()), Some(result))
                } else {
                    (Phase::Verifying(batch), None)
                }
            }
            idle_or_resolved => (idle_or_resolved, None),
        };
        self.phase = next;
        resolved
    }

    pub fn status(&self) -> CalibrationStatus {
        match &self.phase {
            Phase::Idle => CalibrationStatus::Idle,
            Phase::Calibrating(_) => CalibrationStatus::Calibrating,
            Phase::Verifying(_) => CalibrationStatus::Verifying,
            Phase::Resolved(result) => CalibrationStatus::Resolved(result.label),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Calibrating(_) | Phase::Verifying(_))
    }

    /// Outcome of the most recent run, including `unavailable` ones.
    pub fn last_result(&self) -> Option<&CalibrationResult> {
        match &self.phase {
            Phase::Resolved(result) => Some(result),
            _ => None,
        }
    }

    fn finish_calibration(
        &self,
        batch: CalibrationBatch,
        now: Instant,
    ) -> (Phase, Option<CalibrationResult>) {
        let samples = batch.directions.len();
        let desired = self
            .fixation_target
            .and_then(|target| Unit::try_new(target - batch.last_origin, 1e-6));

        let Some(desired) = desired.filter(|_| samples > 0) else {
            warn!(
                "Drift calibration {} unavailable: {} samples, fixation target {}",
                batch.run_id,
                samples,
                if self.fixation_target.is_some() { "set" } else { "missing" }
            );
            let result = CalibrationResult::unavailable(batch.run_id, samples);
            return (Phase::Resolved(result.clone()), Some(result));
        };

        let average = average_direction(batch.directions.iter());
        let raw_error_deg = angle_deg(&average, &desired);
        let offset = from_to_rotation(&average, &desired);

        let verification = VerificationBatch {
            run_id: batch.run_id,
            deadline: deadline_after(now, batch.verify_timeout),
            capacity: self.config.verify_samples(),
            offset,
            raw_error_deg,
            calibration_samples: samples,
            error_sum_deg: 0.0,
            count: 0,
        };
        (Phase::Verifying(verification), None)
    }

    fn resolve(&self, batch: VerificationBatch) -> CalibrationResult {
        let label = if batch.raw_error_deg > self.config.max_allowed_drift_deg {
            CalibrationLabel::Corrected
        } else {
            CalibrationLabel::Ok
        };
        let result = CalibrationResult {
            run_id: batch.run_id,
            offset: batch.offset,
            raw_error_deg: batch.raw_error_deg,
            residual_deg: batch.residual_deg(),
            label,
            calibration_samples: batch.calibration_samples,
            verification_samples: batch.count,
            completed_at: Utc::now(),
        };

        info!(
            "Drift calibration {}: raw={:.2} deg, residual={} ({})",
            result.run_id,
            result.raw_error_deg,
            result
                .residual()
                .map(|r| format!("{r:.2} deg"))
                .unwrap_or_else(|| "n/a".to_string()),
            label.as_str()
        );

        self.correction.publish(result.clone());
        result
    }
}
