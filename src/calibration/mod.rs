pub mod algorithm;
pub mod config;
pub mod correction;
pub mod geometry;

pub use algorithm::{CalibrationStatus, DriftCalibrator};
pub use config::CalibrationConfig;
pub use correction::{CorrectionReader, DriftCorrection};
