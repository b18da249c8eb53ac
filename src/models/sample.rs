use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::gaze::{EyeSide, GazeSample};
use super::pose::forward;

/// Hit name recorded when a ray strikes nothing.
pub const NO_HIT: &str = "none";

/// Which acquisition path produced the ray stored in a sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RaySource {
    Head,
    CombinedGaze,
    LeftEye,
    RightEye,
}

impl RaySource {
    pub fn from_eye(side: EyeSide) -> Self {
        match side {
            EyeSide::Left => Self::LeftEye,
            EyeSide::Right => Self::RightEye,
        }
    }

    pub fn uses_gaze(&self) -> bool {
        !matches!(self, Self::Head)
    }
}

/// One fused head/eye observation.
///
/// `position`/`forward` hold the ray that was raycast (gaze when available,
/// head otherwise); `source` says which. When `is_valid` is false the ray and
/// head fields carry no observation and must not be read as zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysioSample {
    /// Seconds on the pipeline's monotonic clock.
    pub timestamp: f64,
    pub source: RaySource,
    /// Set by the fixed-rate sampler; `None` on frontend snapshots.
    pub sampler_hz: Option<u32>,
    pub position: Point3<f32>,
    pub forward: Vector3<f32>,
    pub head_position: Point3<f32>,
    pub head_forward: Vector3<f32>,
    pub hit_object: String,
    pub is_valid: bool,
    pub left_eye: GazeSample,
    pub right_eye: GazeSample,
}

impl PhysioSample {
    pub fn head(
        timestamp: f64,
        head_position: Point3<f32>,
        head_forward: Vector3<f32>,
        is_valid: bool,
    ) -> Self {
        Self {
            timestamp,
            source: RaySource::Head,
            sampler_hz: None,
            position: head_position,
            forward: head_forward,
            head_position,
            head_forward,
            hit_object: NO_HIT.to_string(),
            is_valid,
            left_eye: GazeSample::default(),
            right_eye: GazeSample::default(),
        }
    }

    /// Placeholder published when no pose source answered at all.
    pub fn invalid(timestamp: f64) -> Self {
        Self::head(timestamp, Point3::origin(), forward(), false)
    }

    pub fn eye(&self, side: EyeSide) -> &GazeSample {
        match side {
            EyeSide::Left => &self.left_eye,
            EyeSide::Right => &self.right_eye,
        }
    }

    pub fn gaze_valid(&self) -> bool {
        self.is_valid && self.source.uses_gaze()
    }

    pub fn hit_something(&self) -> bool {
        self.hit_object != NO_HIT
    }
}
