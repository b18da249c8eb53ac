//! Hardware-free collaborators: a binocular tracker that fixates a point and a
//! scene of named spheres.

use std::sync::{Arc, Mutex, MutexGuard};

use nalgebra::{Point3, Unit, UnitQuaternion, Vector2, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::models::{forward, EyeSide, Pose};

use super::source::{
    PerEye, RawEyeGaze, RawEyelid, RawPupil, RayCaster, SensorError, SensorSource,
};

/// Interpupillary distance in metres.
const DEFAULT_IPD: f32 = 0.064;
const DEFAULT_EYE_HEIGHT: f32 = 1.6;
const BASE_PUPIL_MM: f32 = 3.5;

/// One of the three per-frame eye reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCall {
    Gaze,
    Pupil,
    Eyelid,
}

struct SimulatedState {
    head: Option<Pose>,
    look_at: Point3<f32>,
    drift: UnitQuaternion<f32>,
    noise_deg: f32,
    eye_open: PerEye<bool>,
    eye_tracking_present: bool,
    fail_reads: bool,
    failing_call: Option<SensorCall>,
    rng: StdRng,
}

/// Simulated head and binocular eye tracker.
///
/// Both eyes fixate `look_at`; the reported world rotation is offset by a
/// configurable drift rotation and optional angular noise. Clones share state,
/// so a test can keep a handle after giving the sensor to the frontend.
#[derive(Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedSensor {
    pub fn new(seed: u64) -> Self {
        let head = Pose::new(
            Point3::new(0.0, DEFAULT_EYE_HEIGHT, 0.0),
            UnitQuaternion::identity(),
        );
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                head: Some(head),
                look_at: Point3::new(0.0, DEFAULT_EYE_HEIGHT, 2.0),
                drift: UnitQuaternion::identity(),
                noise_deg: 0.0,
                eye_open: PerEye::new(true, true),
                eye_tracking_present: true,
                fail_reads: false,
                failing_call: None,
                rng: StdRng::seed_from_u64(seed),
            })),
        }
    }

    pub fn with_head_pose(self, head: Option<Pose>) -> Self {
        self.lock().head = head;
        self
    }

    pub fn looking_at(self, point: Point3<f32>) -> Self {
        self.set_look_at(point);
        self
    }

    pub fn with_drift(self, drift: UnitQuaternion<f32>) -> Self {
        self.lock().drift = drift;
        self
    }

    /// Maximum angular noise per reading, in degrees.
    pub fn with_noise_deg(self, noise_deg: f32) -> Self {
        self.lock().noise_deg = noise_deg.max(0.0);
        self
    }

    pub fn without_eye_tracking(self) -> Self {
        self.lock().eye_tracking_present = false;
        self
    }

    pub fn set_look_at(&self, point: Point3<f32>) {
        self.lock().look_at = point;
    }

    pub fn set_eye_open(&self, side: EyeSide, open: bool) {
        let mut state = self.lock();
        match side {
            EyeSide::Left => state.eye_open.left = open,
            EyeSide::Right => state.eye_open.right = open,
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Fails only `call`, so a frame can read gaze and then lose pupils.
    pub fn set_failing_call(&self, call: Option<SensorCall>) {
        self.lock().failing_call = call;
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_readable(state: &SimulatedState, call: SensorCall) -> Result<(), SensorError> {
        if !state.eye_tracking_present {
            return Err(SensorError::Unavailable("no eye tracker attached".into()));
        }
        if state.fail_reads || state.failing_call == Some(call) {
            return Err(SensorError::ReadFailed(format!("injected {call:?} failure")));
        }
        Ok(())
    }
}

impl SimulatedState {
    fn eye_gaze(&mut self, side: EyeSide) -> RawEyeGaze {
        let open = *self.eye_open.get(side);
        if !open {
            return RawEyeGaze::default();
        }

        let head = self.head.unwrap_or_default();
        let half_ipd = DEFAULT_IPD / 2.0;
        let local_position = match side {
            EyeSide::Left => Point3::new(-half_ipd, 0.0, 0.0),
            EyeSide::Right => Point3::new(half_ipd, 0.0, 0.0),
        };
        let world_position = head.transform_point(&local_position);
        let true_direction = self.look_at - world_position;
        let true_world = UnitQuaternion::rotation_between(&forward(), &true_direction)
            .unwrap_or_else(UnitQuaternion::identity);

        let measured_world = self.drift * self.noise() * true_world;
        RawEyeGaze {
            is_valid: true,
            position: local_position,
            rotation: head.rotation.inverse() * measured_world,
        }
    }

    fn noise(&mut self) -> UnitQuaternion<f32> {
        if self.noise_deg <= 0.0 {
            return UnitQuaternion::identity();
        }
        let axis = Vector3::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
        );
        let Some(axis) = Unit::try_new(axis, 1e-6) else {
            return UnitQuaternion::identity();
        };
        let angle = self.rng.gen_range(0.0..self.noise_deg).to_radians();
        UnitQuaternion::from_axis_angle(&axis, angle)
    }

    fn pupil(&mut self, side: EyeSide) -> RawPupil {
        if !*self.eye_open.get(side) {
            return RawPupil::default();
        }
        RawPupil {
            diameter_valid: true,
            diameter_mm: BASE_PUPIL_MM + self.rng.gen_range(-0.2..0.2),
            position_valid: true,
            position: Vector2::new(0.5, 0.5),
        }
    }

    fn eyelid(&self, side: EyeSide) -> RawEyelid {
        let open = *self.eye_open.get(side);
        RawEyelid {
            is_valid: true,
            openness: if open { 1.0 } else { 0.0 },
            squeeze: if open { 0.0 } else { 0.8 },
            wide: 0.0,
        }
    }
}

impl SensorSource for SimulatedSensor {
    fn head_pose(&mut self) -> Option<Pose> {
        self.lock().head
    }

    fn binocular_gaze(&mut self) -> Result<PerEye<RawEyeGaze>, SensorError> {
        let mut state = self.lock();
        Self::check_readable(&state, SensorCall::Gaze)?;
        Ok(PerEye::new(
            state.eye_gaze(EyeSide::Left),
            state.eye_gaze(EyeSide::Right),
        ))
    }

    fn pupil_data(&mut self) -> Result<PerEye<RawPupil>, SensorError> {
        let mut state = self.lock();
        Self::check_readable(&state, SensorCall::Pupil)?;
        Ok(PerEye::new(state.pupil(EyeSide::Left), state.pupil(EyeSide::Right)))
    }

    fn eyelid_geometry(&mut self) -> Result<PerEye<RawEyelid>, SensorError> {
        let state = self.lock();
        Self::check_readable(&state, SensorCall::Eyelid)?;
        Ok(PerEye::new(state.eyelid(EyeSide::Left), state.eyelid(EyeSide::Right)))
    }
}

#[derive(Debug, Clone)]
pub struct SceneSphere {
    pub name: String,
    pub center: Point3<f32>,
    pub radius: f32,
}

impl SceneSphere {
    /// Distance along the unit `direction` to the first surface crossing.
    fn intersect(&self, origin: &Point3<f32>, direction: &Vector3<f32>) -> Option<f32> {
        let oc = origin - self.center;
        let b = oc.dot(direction);
        let c = oc.norm_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = -b - root;
        let far = -b + root;
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            Some(far)
        } else {
            None
        }
    }
}

/// Static collision scene made of named spheres.
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    spheres: Vec<SceneSphere>,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sphere(mut self, name: impl Into<String>, center: Point3<f32>, radius: f32) -> Self {
        self.spheres.push(SceneSphere {
            name: name.into(),
            center,
            radius,
        });
        self
    }
}

impl RayCaster for StaticScene {
    fn raycast(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<String> {
        let direction = Unit::try_new(*direction, 1e-6)?;
        self.spheres
            .iter()
            .filter_map(|sphere| {
                sphere
                    .intersect(origin, &direction)
                    .filter(|distance| *distance <= max_distance)
                    .map(|distance| (distance, sphere))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, sphere)| sphere.name.clone())
    }
}
