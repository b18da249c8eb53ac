use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Local forward axis shared by head, eye and calibration geometry.
pub fn forward() -> Vector3<f32> {
    Vector3::z()
}

/// Rigid pose in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Point3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * forward()
    }

    /// Maps a point expressed in this pose's local frame into world space.
    pub fn transform_point(&self, local: &Point3<f32>) -> Point3<f32> {
        self.position + self.rotation * local.coords
    }

    /// Composes a local rotation onto this pose's orientation.
    pub fn transform_rotation(&self, local: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        self.rotation * local
    }
}

/// Origin and unit direction of a fused gaze (or head) ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeRay {
    pub origin: Point3<f32>,
    pub direction: Unit<Vector3<f32>>,
}

impl GazeRay {
    /// Builds a ray, rejecting directions too short to normalise.
    pub fn try_new(origin: Point3<f32>, direction: Vector3<f32>) -> Option<Self> {
        Unit::try_new(direction, 1e-6).map(|direction| Self { origin, direction })
    }
}
