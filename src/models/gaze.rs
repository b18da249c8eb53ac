use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::pose::{forward, Pose};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EyeSide {
    Left,
    Right,
}

/// Per-eye reading for one frame. Every field stays zero/invalid until the
/// frontend populates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeSample {
    pub gaze_valid: bool,
    /// Eye origin in head-local space, as reported by the tracker.
    pub local_position: Point3<f32>,
    pub local_rotation: UnitQuaternion<f32>,
    /// World-space pose after drift correction.
    pub world_position: Point3<f32>,
    pub world_rotation: UnitQuaternion<f32>,

    pub pupil_diameter_valid: bool,
    /// Millimetres.
    pub pupil_diameter_mm: f32,
    pub pupil_position_valid: bool,
    /// Normalised sensor coordinates.
    pub pupil_position: Vector2<f32>,

    pub geometry_valid: bool,
    /// 0.0 = closed, 1.0 = fully open.
    pub openness: f32,
    pub squeeze: f32,
    pub wide: f32,
}

impl Default for GazeSample {
    fn default() -> Self {
        Self {
            gaze_valid: false,
            local_position: Point3::origin(),
            local_rotation: UnitQuaternion::identity(),
            world_position: Point3::origin(),
            world_rotation: UnitQuaternion::identity(),
            pupil_diameter_valid: false,
            pupil_diameter_mm: 0.0,
            pupil_position_valid: false,
            pupil_position: Vector2::zeros(),
            geometry_valid: false,
            openness: 0.0,
            squeeze: 0.0,
            wide: 0.0,
        }
    }
}

impl GazeSample {
    pub fn world_forward(&self) -> Vector3<f32> {
        self.world_rotation * forward()
    }

    /// World pose of this eye, if its gaze was valid.
    pub fn world_pose(&self) -> Option<Pose> {
        self.gaze_valid
            .then(|| Pose::new(self.world_position, self.world_rotation))
    }
}
