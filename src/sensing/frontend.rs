use std::sync::Arc;

use nalgebra::{center, Point3, UnitQuaternion, Vector3};

use crate::calibration::CorrectionReader;
use crate::models::{
    forward, EyeSide, GazeRay, GazeSample, PhysioSample, Pose, RaySource, NO_HIT,
};
use crate::settings::FrontendSettings;

use super::clock::StudyClock;
use super::snapshot::SnapshotCell;
use super::source::{PerEye, RawEyeGaze, RawEyelid, RawPupil, RayCaster, SensorError, SensorSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Consecutive failed eye reads between repeated error lines.
const READ_FAILURE_LOG_EVERY: u64 = 120;

/// One frame's worth of eye data, populated atomically for both eyes.
struct EyeFrame {
    eyes: PerEye<GazeSample>,
    /// Both-eyes fused ray before drift correction, for calibration.
    raw_binocular: Option<GazeRay>,
}

/// Per-frame reader that fuses head pose and binocular gaze into one snapshot.
///
/// Runs on the frame thread. Each `update` reads the sensors once, applies the
/// current drift correction, performs a single raycast and publishes the result
/// into the shared [`SnapshotCell`] for the fixed-rate sampler.
pub struct AcquisitionFrontend {
    sensor: Box<dyn SensorSource>,
    raycaster: Arc<dyn RayCaster>,
    correction: CorrectionReader,
    snapshot: SnapshotCell,
    clock: StudyClock,
    settings: FrontendSettings,
    reference_camera: Option<Pose>,
    eye_tracking_available: bool,
    raw_binocular: Option<GazeRay>,
    last_sample: Option<PhysioSample>,
    consecutive_read_failures: u64,
}

impl AcquisitionFrontend {
    pub fn new(
        sensor: Box<dyn SensorSource>,
        raycaster: Arc<dyn RayCaster>,
        correction: CorrectionReader,
        snapshot: SnapshotCell,
        clock: StudyClock,
        settings: FrontendSettings,
    ) -> Self {
        let mut frontend = Self {
            sensor,
            raycaster,
            correction,
            snapshot,
            clock,
            settings,
            reference_camera: None,
            eye_tracking_available: false,
            raw_binocular: None,
            last_sample: None,
            consecutive_read_failures: 0,
        };
        frontend.detect_environment();
        frontend
    }

    /// Checks once whether the eye tracker answers. Forced simulator mode skips
    /// the check.
    pub fn detect_environment(&mut self) -> bool {
        if self.settings.force_simulator {
            log_info!("Simulator mode: eye tracking disabled");
            self.eye_tracking_available = false;
            return false;
        }

        self.eye_tracking_available = match self.sensor.binocular_gaze() {
            Ok(_) => {
                log_info!("Eye tracking available");
                true
            }
            Err(err) => {
                log_warn!("Eye tracking unavailable: {err}");
                false
            }
        };
        self.eye_tracking_available
    }

    pub fn eye_tracking_available(&self) -> bool {
        self.eye_tracking_available
    }

    /// Switches simulator mode at runtime and re-detects eye tracking.
    pub fn set_simulator_mode(&mut self, forced: bool) {
        self.settings.force_simulator = forced;
        self.detect_environment();
    }

    /// Camera transform used when no head-tracking device answers.
    pub fn set_reference_camera(&mut self, pose: Option<Pose>) {
        self.reference_camera = pose;
    }

    /// Reads sensors, fuses, raycasts and publishes one snapshot.
    pub fn update(&mut self) -> &PhysioSample {
        let timestamp = self.clock.now_secs();
        self.raw_binocular = None;

        let sample = match self.head_pose() {
            Some(head) => self.fuse_frame(timestamp, &head),
            None => {
                log_debug!("No head pose or reference camera; publishing invalid snapshot");
                PhysioSample::invalid(timestamp)
            }
        };

        self.snapshot.publish(sample.clone());
        self.last_sample.insert(sample)
    }

    /// Uncorrected both-eyes gaze ray from the last frame, if both eyes were valid.
    pub fn raw_binocular_gaze(&self) -> Option<GazeRay> {
        self.raw_binocular
    }

    /// Drift-corrected world pose of one eye from the last frame.
    pub fn eye_gaze_pose(&self, side: EyeSide) -> Option<Pose> {
        self.last_sample.as_ref()?.eye(side).world_pose()
    }

    pub fn last_snapshot(&self) -> Option<&PhysioSample> {
        self.last_sample.as_ref()
    }

    fn head_pose(&mut self) -> Option<Pose> {
        self.sensor.head_pose().or(self.reference_camera)
    }

    fn fuse_frame(&mut self, timestamp: f64, head: &Pose) -> PhysioSample {
        let head_forward = head.forward();
        let mut sample = PhysioSample::head(timestamp, head.position, head_forward, true);

        if self.eye_tracking_available && !self.settings.force_simulator {
            let offset = self.correction.offset();
            match self.read_eyes(head, &offset) {
                Ok(frame) => {
                    self.note_read_recovered();
                    sample.left_eye = frame.eyes.left;
                    sample.right_eye = frame.eyes.right;
                    self.raw_binocular = frame.raw_binocular;
                }
                Err(err) => self.note_read_failure(&err),
            }
        }

        match fuse_gaze(&sample.left_eye, &sample.right_eye) {
            Some((source, ray)) => {
                sample.source = source;
                sample.position = ray.origin;
                sample.forward = ray.direction.into_inner();
                sample.hit_object =
                    self.raycast_name(&ray.origin, &sample.forward, self.settings.gaze_ray_length);
            }
            None => {
                if sample.left_eye.gaze_valid && sample.right_eye.gaze_valid {
                    log_debug!("{}", SensorError::Degenerate("binocular gaze directions cancel"));
                }
                sample.hit_object =
                    self.raycast_name(&head.position, &head_forward, self.settings.head_ray_length);
            }
        }
        sample
    }

    /// Any failed call invalidates both eyes for the frame.
    fn read_eyes(
        &mut self,
        head: &Pose,
        offset: &UnitQuaternion<f32>,
    ) -> Result<EyeFrame, SensorError> {
        let gaze = self.sensor.binocular_gaze()?;
        let pupil = self.sensor.pupil_data()?;
        let lids = self.sensor.eyelid_geometry()?;

        let left = populate_eye(&gaze.left, &pupil.left, &lids.left, head, offset);
        let right = populate_eye(&gaze.right, &pupil.right, &lids.right, head, offset);

        let raw_binocular = if gaze.left.is_valid && gaze.right.is_valid {
            let raw_left = head.transform_rotation(&gaze.left.rotation) * forward();
            let raw_right = head.transform_rotation(&gaze.right.rotation) * forward();
            GazeRay::try_new(
                center(&left.world_position, &right.world_position),
                raw_left + raw_right,
            )
        } else {
            None
        };

        Ok(EyeFrame {
            eyes: PerEye::new(left, right),
            raw_binocular,
        })
    }

    fn raycast_name(&self, origin: &Point3<f32>, direction: &Vector3<f32>, max_distance: f32) -> String {
        if direction.norm_squared() < 1e-8 {
            return NO_HIT.to_string();
        }
        self.raycaster
            .raycast(origin, direction, max_distance)
            .unwrap_or_else(|| NO_HIT.to_string())
    }

    fn note_read_failure(&mut self, err: &SensorError) {
        self.consecutive_read_failures += 1;
        if self.consecutive_read_failures % READ_FAILURE_LOG_EVERY == 1 {
            log_error!(
                "Eye tracking read failed ({} consecutive): {err}",
                self.consecutive_read_failures
            );
        }
    }

    fn note_read_recovered(&mut self) {
        if self.consecutive_read_failures > 0 {
            log_info!(
                "Eye tracking reads recovered after {} failures",
                self.consecutive_read_failures
            );
            self.consecutive_read_failures = 0;
        }
    }
}

fn populate_eye(
    gaze: &RawEyeGaze,
    pupil: &RawPupil,
    lid: &RawEyelid,
    head: &Pose,
    offset: &UnitQuaternion<f32>,
) -> GazeSample {
    let mut eye = GazeSample::default();

    eye.gaze_valid = gaze.is_valid;
    if gaze.is_valid {
        eye.local_position = gaze.position;
        eye.local_rotation = gaze.rotation;
        eye.world_position = head.transform_point(&gaze.position);
        eye.world_rotation = offset * head.transform_rotation(&gaze.rotation);
    }

    eye.pupil_diameter_valid = pupil.diameter_valid;
    if pupil.diameter_valid {
        eye.pupil_diameter_mm = pupil.diameter_mm;
    }
    eye.pupil_position_valid = pupil.position_valid;
    if pupil.position_valid {
        eye.pupil_position = pupil.position;
    }

    eye.geometry_valid = lid.is_valid;
    if lid.is_valid {
        eye.openness = lid.openness;
        eye.squeeze = lid.squeeze;
        eye.wide = lid.wide;
    }
    eye
}

/// Fused gaze ray from the valid eyes: both eyes give the midpoint origin and
/// the normalised mean direction, one eye is used alone. `None` when no eye is
/// valid or the directions cancel.
pub fn fuse_gaze(left: &GazeSample, right: &GazeSample) -> Option<(RaySource, GazeRay)> {
    match (left.gaze_valid, right.gaze_valid) {
        (true, true) => GazeRay::try_new(
            center(&left.world_position, &right.world_position),
            left.world_forward() + right.world_forward(),
        )
        .map(|ray| (RaySource::CombinedGaze, ray)),
        (true, false) => GazeRay::try_new(left.world_position, left.world_forward())
            .map(|ray| (RaySource::from_eye(EyeSide::Left), ray)),
        (false, true) => GazeRay::try_new(right.world_position, right.world_forward())
            .map(|ray| (RaySource::from_eye(EyeSide::Right), ray)),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::DriftCorrection;
    use crate::models::{CalibrationLabel, CalibrationResult};
    use crate::sensing::simulated::{SensorCall, SimulatedSensor, StaticScene};
    use approx::assert_relative_eq;
    use chrono::Utc;
    use uuid::Uuid;

    fn eye_at(x: f32, direction: Vector3<f32>) -> GazeSample {
        let mut eye = GazeSample::default();
        eye.gaze_valid = true;
        eye.world_position = Point3::new(x, 1.6, 0.0);
        eye.world_rotation = UnitQuaternion::rotation_between(&forward(), &direction)
            .unwrap_or_else(UnitQuaternion::identity);
        eye
    }

    fn scene() -> Arc<dyn RayCaster> {
        Arc::new(
            StaticScene::new()
                .with_sphere("fixation", Point3::new(0.0, 1.6, 2.0), 0.2)
                .with_sphere("far_wall_marker", Point3::new(0.0, 1.6, 40.0), 1.0),
        )
    }

    fn frontend_with(sensor: SimulatedSensor, correction: &DriftCorrection) -> (AcquisitionFrontend, SnapshotCell) {
        let cell = SnapshotCell::new();
        let frontend = AcquisitionFrontend::new(
            Box::new(sensor),
            scene(),
            correction.reader(),
            cell.clone(),
            StudyClock::new(),
            FrontendSettings::default(),
        );
        (frontend, cell)
    }

    #[test]
    fn test_fuse_gaze_both_eyes_uses_midpoint_and_mean_direction() {
        let left = eye_at(-0.03, Vector3::new(0.1, 0.0, 1.0));
        let right = eye_at(0.03, Vector3::new(-0.1, 0.0, 1.0));
        let (source, ray) = fuse_gaze(&left, &right).unwrap();
        assert_eq!(source, RaySource::CombinedGaze);
        assert_relative_eq!(ray.origin.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(ray.direction.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ray.direction.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_fuse_gaze_single_eye_and_none() {
        let left = eye_at(-0.03, Vector3::z());
        let right = GazeSample::default();
        let (source, ray) = fuse_gaze(&left, &right).unwrap();
        assert_eq!(source, RaySource::LeftEye);
        assert_relative_eq!(ray.origin.x, -0.03);

        let (source, _) = fuse_gaze(&right, &left).unwrap();
        assert_eq!(source, RaySource::RightEye);

        assert!(fuse_gaze(&GazeSample::default(), &GazeSample::default()).is_none());
    }

    #[test]
    fn test_fuse_gaze_opposite_directions_is_degenerate() {
        let left = eye_at(-0.03, Vector3::x());
        let right = eye_at(0.03, -Vector3::x());
        assert!(fuse_gaze(&left, &right).is_none());
    }

    #[test]
    fn test_update_publishes_gaze_snapshot_hitting_target() {
        let sensor = SimulatedSensor::new(7).looking_at(Point3::new(0.0, 1.6, 2.0));
        let correction = DriftCorrection::new();
        let (mut frontend, cell) = frontend_with(sensor, &correction);
        assert!(frontend.eye_tracking_available());

        let sample = frontend.update().clone();
        assert!(sample.is_valid);
        assert_eq!(sample.source, RaySource::CombinedGaze);
        assert_eq!(sample.hit_object, "fixation");
        assert!(sample.left_eye.gaze_valid && sample.right_eye.gaze_valid);
        assert!(sample.left_eye.pupil_diameter_valid);
        assert_eq!(cell.take_latest_clone(), Some(sample));
        assert!(frontend.raw_binocular_gaze().is_some());
        assert!(frontend.eye_gaze_pose(EyeSide::Left).is_some());
    }

    #[test]
    fn test_read_failure_publishes_head_only() {
        let sensor = SimulatedSensor::new(1).looking_at(Point3::new(0.0, 1.6, 2.0));
        let control = sensor.clone();
        let correction = DriftCorrection::new();
        let (mut frontend, cell) = frontend_with(sensor, &correction);

        control.set_fail_reads(true);
        let sample = frontend.update().clone();
        assert!(sample.is_valid);
        assert_eq!(sample.source, RaySource::Head);
        assert!(!sample.left_eye.gaze_valid);
        assert!(!sample.right_eye.gaze_valid);
        assert!(!sample.left_eye.pupil_diameter_valid);
        // Head looks straight ahead at the fixation sphere too.
        assert_eq!(sample.hit_object, "fixation");
        assert!(frontend.raw_binocular_gaze().is_none());
        assert_eq!(cell.take_latest_clone(), Some(sample));

        control.set_fail_reads(false);
        assert_eq!(frontend.update().source, RaySource::CombinedGaze);
    }

    #[test]
    fn test_forced_simulator_skips_eye_tracking() {
        let sensor = SimulatedSensor::new(1);
        let cell = SnapshotCell::new();
        let settings = FrontendSettings {
            force_simulator: true,
            ..FrontendSettings::default()
        };
        let mut frontend = AcquisitionFrontend::new(
            Box::new(sensor),
            scene(),
            DriftCorrection::new().reader(),
            cell,
            StudyClock::new(),
            settings,
        );
        assert!(!frontend.eye_tracking_available());
        assert_eq!(frontend.update().source, RaySource::Head);
    }

    #[test]
    fn test_partial_batch_failure_invalidates_both_eyes() {
        let sensor = SimulatedSensor::new(5).looking_at(Point3::new(0.0, 1.6, 2.0));
        let control = sensor.clone();
        let correction = DriftCorrection::new();
        let (mut frontend, cell) = frontend_with(sensor, &correction);
        assert_eq!(frontend.update().source, RaySource::CombinedGaze);

        for call in [SensorCall::Pupil, SensorCall::Eyelid] {
            control.set_failing_call(Some(call));
            let sample = frontend.update().clone();
            assert!(sample.is_valid);
            assert_eq!(sample.source, RaySource::Head, "{call:?}");
            assert!(!sample.left_eye.gaze_valid && !sample.right_eye.gaze_valid);
            assert!(!sample.left_eye.pupil_diameter_valid && !sample.right_eye.geometry_valid);
            assert!(frontend.raw_binocular_gaze().is_none());
            assert!(frontend.eye_gaze_pose(EyeSide::Right).is_none());
            assert_eq!(cell.take_latest_clone(), Some(sample));
        }

        control.set_failing_call(None);
        assert_eq!(frontend.update().source, RaySource::CombinedGaze);
    }

    #[test]
    fn test_set_simulator_mode_toggles_eye_tracking() {
        let sensor = SimulatedSensor::new(8).looking_at(Point3::new(0.0, 1.6, 2.0));
        let correction = DriftCorrection::new();
        let (mut frontend, _cell) = frontend_with(sensor, &correction);
        assert!(frontend.eye_tracking_available());

        frontend.set_simulator_mode(true);
        assert!(!frontend.eye_tracking_available());
        assert_eq!(frontend.update().source, RaySource::Head);
        assert!(frontend.raw_binocular_gaze().is_none());

        frontend.set_simulator_mode(false);
        assert!(frontend.eye_tracking_available());
        assert_eq!(frontend.update().source, RaySource::CombinedGaze);
    }

    #[test]
    fn test_reference_camera_fallback_and_invalid_without_pose() {
        let sensor = SimulatedSensor::new(1).with_head_pose(None);
        let correction = DriftCorrection::new();
        let (mut frontend, _cell) = frontend_with(sensor, &correction);

        let sample = frontend.update().clone();
        assert!(!sample.is_valid);
        assert_eq!(sample.hit_object, NO_HIT);

        frontend.set_reference_camera(Some(Pose::new(
            Point3::new(0.0, 1.6, 0.0),
            UnitQuaternion::identity(),
        )));
        let sample = frontend.update().clone();
        assert!(sample.is_valid);
        assert_relative_eq!(sample.head_position.y, 1.6);
    }

    #[test]
    fn test_drift_correction_is_applied_to_eye_world_rotation() {
        let drift = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 6f32.to_radians());
        let sensor = SimulatedSensor::new(3)
            .looking_at(Point3::new(0.0, 1.6, 2.0))
            .with_drift(drift);
        let correction = DriftCorrection::new();
        let (mut frontend, _cell) = frontend_with(sensor, &correction);

        let uncorrected = frontend.update().clone();
        let miss = crate::calibration::geometry::angle_deg(&uncorrected.forward, &Vector3::z());
        assert!(miss > 5.0, "expected drifted gaze, got {miss}");

        correction.publish(CalibrationResult {
            run_id: Uuid::new_v4(),
            offset: drift.inverse(),
            raw_error_deg: 6.0,
            residual_deg: 0.0,
            label: CalibrationLabel::Corrected,
            calibration_samples: 1,
            verification_samples: 1,
            completed_at: Utc::now(),
        });
        let corrected = frontend.update().clone();
        let miss = crate::calibration::geometry::angle_deg(&corrected.forward, &Vector3::z());
        assert!(miss < 0.5, "expected corrected gaze, got {miss}");
        assert_eq!(corrected.hit_object, "fixation");

        // Calibration input stays uncorrected.
        let raw = frontend.raw_binocular_gaze().unwrap();
        assert!(crate::calibration::geometry::angle_deg(&raw.direction, &Vector3::z()) > 5.0);
    }
}
