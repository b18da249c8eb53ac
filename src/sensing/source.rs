//! Collaborator seams: the tracking hardware and the scene's collision query.

use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use thiserror::Error;

use crate::models::{EyeSide, Pose};

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
    #[error("sensor read failed: {0}")]
    ReadFailed(String),
    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),
}

/// A value reported once per eye in a single batched read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerEye<T> {
    pub left: T,
    pub right: T,
}

impl<T> PerEye<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: EyeSide) -> &T {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }
}

/// Gaze pose of one eye in head-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEyeGaze {
    pub is_valid: bool,
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for RawEyeGaze {
    fn default() -> Self {
        Self {
            is_valid: false,
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawPupil {
    pub diameter_valid: bool,
    pub diameter_mm: f32,
    pub position_valid: bool,
    pub position: Vector2<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawEyelid {
    pub is_valid: bool,
    pub openness: f32,
    pub squeeze: f32,
    pub wide: f32,
}

/// Head-pose and binocular eye-tracking hardware.
///
/// Each eye query returns both eyes from one device read so the pair can never
/// tear across frames.
pub trait SensorSource: Send {
    /// Pose of the dedicated head-tracking device, `None` when it does not answer.
    fn head_pose(&mut self) -> Option<Pose>;

    fn binocular_gaze(&mut self) -> Result<PerEye<RawEyeGaze>, SensorError>;

    fn pupil_data(&mut self) -> Result<PerEye<RawPupil>, SensorError>;

    fn eyelid_geometry(&mut self) -> Result<PerEye<RawEyelid>, SensorError>;
}

/// Scene collision query.
pub trait RayCaster: Send + Sync {
    /// Name of the first object hit within `max_distance`, if any.
    fn raycast(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<String>;
}

impl<T: RayCaster + ?Sized> RayCaster for std::sync::Arc<T> {
    fn raycast(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<String> {
        (**self).raycast(origin, direction, max_distance)
    }
}
