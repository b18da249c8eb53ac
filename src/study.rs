use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{info, warn};
use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::calibration::CalibrationConfig;
use crate::models::TrialIndex;
use crate::pipeline::{StudyPipeline, StudyReport};
use crate::sensing::{SimulatedSensor, StaticScene};
use crate::settings::PipelineSettings;

const EYE_HEIGHT: f32 = 1.6;
/// Render rate of the simulated host, deliberately unrelated to the sampler rate.
const FRAME_HZ: f64 = 72.0;
const SIMULATED_DRIFT_DEG: f32 = 2.5;
const SIMULATED_NOISE_DEG: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct StudyTrial {
    pub index: TrialIndex,
    /// Where the simulated participant looks for the whole trial.
    pub look_at: Point3<f32>,
}

#[derive(Debug, Clone)]
pub struct StudyPlan {
    pub fixation_target: Point3<f32>,
    pub trials: Vec<StudyTrial>,
    pub trial_duration: Duration,
    pub frame_period: Duration,
}

impl Default for StudyPlan {
    fn default() -> Self {
        let stimulus = |x: f32| Point3::new(x, EYE_HEIGHT, 3.0);
        Self {
            fixation_target: Point3::new(0.0, EYE_HEIGHT, 2.0),
            trials: vec![
                StudyTrial { index: 0, look_at: stimulus(-0.8) },
                StudyTrial { index: 1, look_at: stimulus(0.0) },
                StudyTrial { index: 2, look_at: stimulus(0.8) },
            ],
            trial_duration: Duration::from_millis(750),
            frame_period: Duration::from_secs_f64(1.0 / FRAME_HZ),
        }
    }
}

/// Scene matching [`StudyPlan::default`]: a fixation dot and three stimuli.
pub fn default_scene() -> StaticScene {
    StaticScene::new()
        .with_sphere("fixation", Point3::new(0.0, EYE_HEIGHT, 2.0), 0.1)
        .with_sphere("stimulus_left", Point3::new(-0.8, EYE_HEIGHT, 3.0), 0.3)
        .with_sphere("stimulus_center", Point3::new(0.0, EYE_HEIGHT, 3.0), 0.3)
        .with_sphere("stimulus_right", Point3::new(0.8, EYE_HEIGHT, 3.0), 0.3)
}

/// Calibrates, then tracks each trial of `plan` against the simulated sensor.
pub async fn run_study(
    settings: &PipelineSettings,
    sensor: SimulatedSensor,
    scene: StaticScene,
    plan: &StudyPlan,
) -> Result<StudyReport> {
    let control = sensor.clone();
    let mut pipeline = StudyPipeline::new(settings, Box::new(sensor), Arc::new(scene));

    control.set_look_at(plan.fixation_target);
    pipeline.set_fixation_target(Some(plan.fixation_target));
    // Warm the snapshot cell before anything samples it.
    pipeline.run_frames(plan.frame_period, plan.frame_period).await;

    let timeouts = CalibrationConfig::from(&settings.calibration);
    let calibration = pipeline
        .run_calibration(timeouts.calibrate_timeout, timeouts.verify_timeout, plan.frame_period)
        .await;
    if calibration.is_published() {
        info!(
            "calibration {}: raw {:.2} deg, residual {:.2} deg",
            calibration.label.as_str(),
            calibration.raw_error_deg,
            calibration.residual_deg
        );
    } else {
        warn!("calibration unavailable, recording uncorrected gaze");
    }

    for trial in &plan.trials {
        control.set_look_at(trial.look_at);
        pipeline.start_tracking_for_trial(trial.index)?;
        pipeline.run_frames(plan.trial_duration, plan.frame_period).await;
        pipeline.stop_tracking()?;
    }

    Ok(pipeline.report())
}

/// Simulated participant with a fixed vertical drift and a little noise.
pub fn default_sensor(seed: u64) -> SimulatedSensor {
    let drift = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), SIMULATED_DRIFT_DEG.to_radians());
    SimulatedSensor::new(seed)
        .with_drift(drift)
        .with_noise_deg(SIMULATED_NOISE_DEG)
}
