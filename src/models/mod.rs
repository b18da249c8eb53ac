pub mod calibration;
pub mod gaze;
pub mod pose;
pub mod sample;
pub mod trial;

pub use calibration::{CalibrationLabel, CalibrationResult};
pub use gaze::{EyeSide, GazeSample};
pub use pose::{forward, GazeRay, Pose};
pub use sample::{PhysioSample, RaySource, NO_HIT};
pub use trial::{TrialIndex, TrialSummary};
