use chrono::{DateTime, Utc};
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationLabel {
    /// Drift within tolerance; the offset is still published.
    Ok,
    /// Drift exceeded tolerance and the offset corrects it.
    Corrected,
    /// Run aborted; nothing was published.
    Unavailable,
}

impl CalibrationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Corrected => "corrected",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Outcome of one drift calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub run_id: Uuid,
    /// Rotation mapping measured gaze onto the fixation direction.
    pub offset: UnitQuaternion<f32>,
    /// Degrees between averaged gaze and fixation direction before correction.
    pub raw_error_deg: f32,
    /// Mean degrees after correction on the verification batch; NaN when that
    /// batch was empty.
    pub residual_deg: f32,
    pub label: CalibrationLabel,
    pub calibration_samples: usize,
    pub verification_samples: usize,
    pub completed_at: DateTime<Utc>,
}

impl CalibrationResult {
    pub fn unavailable(run_id: Uuid, calibration_samples: usize) -> Self {
        Self {
            run_id,
            offset: UnitQuaternion::identity(),
            raw_error_deg: f32::NAN,
            residual_deg: f32::NAN,
            label: CalibrationLabel::Unavailable,
            calibration_samples,
            verification_samples: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.label != CalibrationLabel::Unavailable
    }

    pub fn residual(&self) -> Option<f32> {
        (!self.residual_deg.is_nan()).then_some(self.residual_deg)
    }
}
