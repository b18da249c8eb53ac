use std::{sync::Arc, time::Duration};

use nalgebra::{Point3, UnitQuaternion, Vector3};
use physio_tracker_lib::{
    calibration::geometry::angle_deg,
    models::{CalibrationLabel, RaySource},
    sensing::{SimulatedSensor, StaticScene},
    settings::PipelineSettings,
    study::{default_scene, default_sensor, run_study, StudyPlan, StudyTrial},
    StudyPipeline,
};

const FRAME: Duration = Duration::from_millis(14);

fn short_plan() -> StudyPlan {
    StudyPlan {
        trial_duration: Duration::from_millis(300),
        ..StudyPlan::default()
    }
}

fn fixation_pipeline(settings: &PipelineSettings, sensor: SimulatedSensor) -> StudyPipeline {
    let scene = StaticScene::new().with_sphere("fixation", Point3::new(0.0, 1.6, 2.0), 0.2);
    StudyPipeline::new(settings, Box::new(sensor), Arc::new(scene))
}

#[tokio::test]
async fn test_study_calibrates_and_buckets_every_trial() {
    let plan = short_plan();
    let report = run_study(
        &PipelineSettings::default(),
        default_sensor(42),
        default_scene(),
        &plan,
    )
    .await
    .unwrap();

    let correction = report.correction.expect("drift should be corrected");
    assert_eq!(correction.label, CalibrationLabel::Corrected);
    assert!((correction.raw_error_deg - 2.5).abs() < 0.5, "raw {}", correction.raw_error_deg);
    assert!(correction.residual_deg < 0.5, "residual {}", correction.residual_deg);

    let trials: Vec<_> = report.trials.iter().map(|t| t.trial).collect();
    assert_eq!(trials, vec![0, 1, 2]);
    for summary in &report.trials {
        assert!(summary.sample_count > 10, "trial {} too short", summary.trial);
        assert_eq!(summary.valid_count, summary.sample_count);
        let rate = summary.effective_rate_hz().unwrap();
        assert!((60.0..=110.0).contains(&rate), "rate {rate}");
    }
    let total: usize = report.trials.iter().map(|t| t.sample_count).sum();
    assert_eq!(report.sampler.enqueued_count as usize, total);
}

#[tokio::test]
async fn test_corrected_gaze_hits_each_trial_stimulus() {
    let settings = PipelineSettings::default();
    let plan = short_plan();
    let sensor = default_sensor(9);
    let control = sensor.clone();
    let mut pipeline = StudyPipeline::new(&settings, Box::new(sensor), Arc::new(default_scene()));

    control.set_look_at(plan.fixation_target);
    pipeline.set_fixation_target(Some(plan.fixation_target));
    pipeline.run_frames(FRAME, FRAME).await;
    let result = pipeline
        .run_calibration(Duration::from_secs(2), Duration::from_secs(2), FRAME)
        .await;
    assert!(result.is_published());

    let expected = ["stimulus_left", "stimulus_center", "stimulus_right"];
    let trials: Vec<StudyTrial> = plan.trials.clone();
    for trial in &trials {
        control.set_look_at(trial.look_at);
        pipeline.run_frames(FRAME, FRAME).await;
        pipeline.start_tracking_for_trial(trial.index).unwrap();
        pipeline.run_frames(plan.trial_duration, FRAME).await;
        pipeline.stop_tracking().unwrap();
    }

    for (trial, name) in trials.iter().zip(expected) {
        let samples = pipeline.get_tracking_data_for(trial.index);
        let hits = samples.iter().filter(|s| s.hit_object == name).count();
        assert!(
            hits * 10 >= samples.len() * 9,
            "trial {}: {hits}/{} samples on {name}",
            trial.index,
            samples.len()
        );
        assert!(samples.iter().all(|s| s.source == RaySource::CombinedGaze));
        assert!(samples.iter().all(|s| s.sampler_hz == Some(90)));
    }
}

#[tokio::test]
async fn test_frames_outside_a_trial_never_reach_buckets() {
    let mut pipeline = fixation_pipeline(&PipelineSettings::default(), SimulatedSensor::new(1));
    pipeline.run_frames(FRAME, FRAME).await;
    pipeline.start_tracking_for_trial(5).unwrap();
    pipeline.run_frames(Duration::from_millis(150), FRAME).await;
    pipeline.stop_tracking().unwrap();

    let before = pipeline.get_all_tracking_data().clone();
    assert_eq!(before.keys().copied().collect::<Vec<_>>(), vec![5]);

    pipeline.run_frames(Duration::from_millis(100), FRAME).await;
    pipeline.stop_tracking().unwrap();
    assert_eq!(pipeline.get_all_tracking_data(), &before);
    assert!(pipeline.active_trial().is_none());

    let samples = pipeline.get_tracking_data_for(5);
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    let count = samples.len();
    assert_eq!(pipeline.sampler_metrics().enqueued_count as usize, count);
}

#[tokio::test]
async fn test_forced_simulator_records_head_rays_and_skips_calibration() {
    let mut settings = PipelineSettings::default();
    settings.frontend.force_simulator = true;
    let mut pipeline = fixation_pipeline(&settings, SimulatedSensor::new(3));
    pipeline.set_fixation_target(Some(Point3::new(0.0, 1.6, 2.0)));
    assert!(!pipeline.frontend().eye_tracking_available());

    let result = pipeline
        .run_calibration(Duration::from_millis(50), Duration::from_millis(50), FRAME)
        .await;
    assert_eq!(result.label, CalibrationLabel::Unavailable);
    assert!(result.residual().is_none());
    assert!(pipeline.get_current_correction().is_none());

    pipeline.start_tracking_for_trial(0).unwrap();
    pipeline.run_frames(Duration::from_millis(100), FRAME).await;
    pipeline.stop_tracking().unwrap();

    let samples = pipeline.get_tracking_data_for(0);
    assert!(!samples.is_empty());
    assert!(samples
        .iter()
        .all(|s| s.source == RaySource::Head && s.hit_object == "fixation"));
}

#[tokio::test]
async fn test_unavailable_rerun_keeps_previous_correction() {
    let target = Point3::new(0.0, 1.6, 2.0);
    let drift = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 3f32.to_radians());
    let sensor = SimulatedSensor::new(5).looking_at(target).with_drift(drift);
    let control = sensor.clone();
    let mut pipeline = fixation_pipeline(&PipelineSettings::default(), sensor);
    pipeline.set_fixation_target(Some(target));

    let first = pipeline
        .run_calibration(Duration::from_secs(2), Duration::from_secs(2), FRAME)
        .await;
    assert_eq!(first.label, CalibrationLabel::Corrected);

    control.set_fail_reads(true);
    let second = pipeline
        .run_calibration(Duration::from_millis(50), Duration::from_millis(50), FRAME)
        .await;
    assert_eq!(second.label, CalibrationLabel::Unavailable);

    let current = pipeline.get_current_correction().unwrap();
    assert_eq!(current.run_id, first.run_id);

    // The offset is a proper rotation: it and its inverse cancel out.
    let v = Vector3::new(0.3, -0.2, 0.9).normalize();
    let back = current.offset.inverse() * (current.offset * v);
    assert!(angle_deg(&v, &back) < 1e-3);

    pipeline.clear_correction();
    assert!(pipeline.get_current_correction().is_none());
}

#[tokio::test]
async fn test_clear_all_empties_buckets_and_metrics() {
    let mut pipeline = fixation_pipeline(&PipelineSettings::default(), SimulatedSensor::new(8));
    pipeline.run_frames(FRAME, FRAME).await;
    for trial in 0..3 {
        pipeline.start_tracking_for_trial(trial).unwrap();
        pipeline.run_frames(Duration::from_millis(60), FRAME).await;
    }
    pipeline.stop_tracking().unwrap();
    assert_eq!(pipeline.trial_summaries().len(), 3);

    pipeline.clear_all().unwrap();
    assert!(pipeline.get_all_tracking_data().is_empty());
    assert_eq!(pipeline.sampler_metrics().tick_count, 0);
    assert!(pipeline.active_trial().is_none());
}
